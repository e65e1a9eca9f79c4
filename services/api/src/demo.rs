use crate::infra::InMemoryGateway;
use chrono::{Duration, Utc};
use clap::Args;
use homeserve::booking::{
    AddressKind, AddressPayload, BookingWizard, ContactDetails, MatchState, ServiceTier, TierTag,
    WizardStep,
};
use homeserve::config::BookingConfig;
use homeserve::error::AppError;
use homeserve::negotiation::{current_proposal, PartyKind, RequestNegotiationMachine};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Hours from now for the requested schedule time. Values inside the
    /// emergency window exercise the confirmation step.
    #[arg(long, default_value_t = 30)]
    pub(crate) schedule_in_hours: i64,
    /// Skip the negotiation portion of the demo.
    #[arg(long)]
    pub(crate) skip_negotiation: bool,
}

fn scheduled_tier() -> ServiceTier {
    ServiceTier {
        tier_id: 2,
        tag: TierTag::Scheduled,
        duration_hours: -1,
        is_schedulable: true,
        payable_amount: 4900,
        refund_amount: 2000,
    }
}

fn emergency_tier() -> ServiceTier {
    ServiceTier {
        tier_id: 1,
        tag: TierTag::Emergency,
        duration_hours: -1,
        is_schedulable: false,
        payable_amount: 9900,
        refund_amount: 0,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        schedule_in_hours,
        skip_negotiation,
    } = args;

    let gateway = Arc::new(InMemoryGateway::new());
    let mut wizard = BookingWizard::new(gateway.clone(), &BookingConfig::default());
    let now = Utc::now();
    let schedule_time = now + Duration::hours(schedule_in_hours);

    println!("Booking wizard demo");
    println!(
        "Requested schedule: {} ({}h from now)",
        schedule_time.format("%Y-%m-%d %H:%M UTC"),
        schedule_in_hours
    );

    wizard.select_services(BTreeSet::from([3, 5])).await?;
    println!("- Services selected -> step {}", wizard.step().label());

    wizard.choose_tier(scheduled_tier()).await?;
    let step = wizard.pick_schedule_time(schedule_time, now).await?;
    if step == WizardStep::AwaitingEmergencyConfirmation {
        println!("- Pick falls inside the emergency window; confirming upgrade");
        wizard.confirm_emergency(emergency_tier()).await?;
    }
    println!("- Schedule committed -> step {}", wizard.step().label());

    let saved = wizard
        .save_address(AddressPayload {
            id: None,
            kind: AddressKind::Home,
            full_address: "4812 Maple Crest Dr".to_string(),
            unit_no: None,
            city: "Dallas".to_string(),
            state: "TX".to_string(),
            country: "US".to_string(),
            zip_code: "75218".to_string(),
            latitude: 32.8353,
            longitude: -96.7009,
        })
        .await?;
    wizard.choose_address(saved.address.id).await?;
    println!(
        "- Address {} saved and selected -> step {}",
        saved.address.id,
        wizard.step().label()
    );

    match wizard.search_providers().await? {
        MatchState::Populated(providers) => {
            println!("- {} providers available:", providers.len());
            for provider in providers {
                println!(
                    "    {} | {} | {:.1} stars ({} reviews) | {:.1} mi",
                    provider.id,
                    provider.name,
                    provider.rating_avg,
                    provider.review_count,
                    provider.distance_miles
                );
            }
        }
        MatchState::Empty => println!("- No providers matched the selection"),
        other => println!("- Search state: {other:?}"),
    }

    let reserved = match wizard.reserve_provider(41).await {
        Ok(()) => {
            println!("- Reserved provider 41 (Lakeside Plumbing)");
            true
        }
        Err(err) => {
            println!("- Reservation failed ({err}); falling back to auto-match");
            wizard.choose_auto_match()?;
            false
        }
    };
    if !reserved {
        println!("- Backend will assign the best available provider");
    }

    wizard.proceed_to_contact()?;
    wizard.set_contact(ContactDetails {
        contact_person: "Dana Whitfield".to_string(),
        phone: "214-555-0188".to_string(),
        description: "Kitchen sink leaking into the cabinet".to_string(),
        files: vec!["https://files.example/sink-leak.jpg".to_string()],
    })?;

    match serde_json::to_string_pretty(&wizard.summary()) {
        Ok(json) => println!("- Review summary:\n{json}"),
        Err(err) => println!("- Review summary unavailable: {err}"),
    }

    let details = wizard.submit().await?;
    println!(
        "- Request {} created -> status {}",
        details.display_id,
        details.status.label()
    );
    println!(
        "- {} draft fields mirrored to the backend during the flow",
        gateway.session_field_count()
    );

    if skip_negotiation {
        return Ok(());
    }

    println!("\nNegotiation demo (provider side)");
    let mut machine = RequestNegotiationMachine::new(gateway.clone(), details.id, PartyKind::Provider);
    let loaded = machine.fetch_details(0).await?;
    let customer_id = loaded.customer.id;
    let view = loaded.status_view();
    println!(
        "- Loaded {} -> status {} | actions {:?}",
        view.display_id, view.status, view.actions
    );

    let proposed_time = schedule_time + Duration::hours(24);
    let proposal = machine
        .propose_new_time(
            "Earliest opening is the next day",
            proposed_time,
            customer_id,
            PartyKind::Customer,
            0,
        )
        .await;
    match proposal {
        Ok(details) => {
            println!("- Counter-offer recorded -> status {}", details.status.label());
            if let Some(entry) = current_proposal(&details.handshakes) {
                println!(
                    "  Live proposal #{}: {} -> {}",
                    entry.id,
                    entry.notes,
                    entry.new_schedule.format("%Y-%m-%d %H:%M UTC")
                );
            }
        }
        Err(err) => println!("- Counter-offer unavailable: {err}"),
    }

    let accepted = machine.accept(0).await?;
    println!("- Accepted -> status {}", accepted.status.label());

    // The machine blocks transitions the current status does not allow.
    match machine.decline("changed my mind", customer_id, 0).await {
        Ok(details) => println!("- Declined -> status {}", details.status.label()),
        Err(err) => println!("- Decline rejected as expected: {err}"),
    }

    Ok(())
}

use crate::booking::BookingError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::negotiation::NegotiationError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Booking(BookingError),
    Negotiation(NegotiationError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Booking(err) => write!(f, "booking error: {}", err),
            AppError::Negotiation(err) => write!(f, "negotiation error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Booking(err) => Some(err),
            AppError::Negotiation(err) => Some(err),
        }
    }
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Network(_) | GatewayError::Malformed(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Auth => StatusCode::UNAUTHORIZED,
        GatewayError::Conflict(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Booking(BookingError::Gateway(err)) => gateway_status(err),
            AppError::Booking(BookingError::ReservationInFlight) => StatusCode::CONFLICT,
            AppError::Booking(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Negotiation(NegotiationError::Gateway(err)) => gateway_status(err),
            AppError::Negotiation(
                NegotiationError::AlreadyHandled | NegotiationError::ActionInFlight,
            ) => StatusCode::CONFLICT,
            AppError::Negotiation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Config(_) | AppError::Telemetry(_) | AppError::Io(_) | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<BookingError> for AppError {
    fn from(value: BookingError) -> Self {
        Self::Booking(value)
    }
}

impl From<NegotiationError> for AppError {
    fn from(value: NegotiationError) -> Self {
        Self::Negotiation(value)
    }
}

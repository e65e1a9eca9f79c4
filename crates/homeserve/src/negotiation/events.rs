use serde::Deserialize;

/// Inbound signal from whatever push transport the host wires up. Its only
/// contract with this core is "refetch details for this id".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RequestEvent {
    Changed { request_id: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid listener '{name}': {reason}")]
    InvalidListener { name: String, reason: String },

    #[error("Unknown listener event: {0}")]
    UnknownEvent(String),
}

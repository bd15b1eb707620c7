use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlerterError {
    #[error("SMTP request failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Failed to build email message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to attach {0}: {1}")]
    Attachment(String, String),

    #[error("Email is not configured. Missing sender, password or SMTP server.")]
    NotConfigured,

    #[error("No email recipients configured.")]
    NoRecipients,

    #[error("Delivery failed for all {0} recipients.")]
    AllFailed(usize),
}

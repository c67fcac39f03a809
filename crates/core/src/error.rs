/// Domain errors shared across the workspace.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The age-confirmation gate was not satisfied or its text was tampered with.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A latent container could not be built or parsed.
    #[error("Invalid latent container: {0}")]
    Format(String),
}

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Checking,
    Passed,
    Failed,
}

/// One entry of the progressive verification trace the mini-app renders.
#[derive(Clone, Debug, Serialize)]
pub struct VerificationStep {
    pub step: &'static str,
    pub status: StepStatus,
    pub message: String,
}

impl VerificationStep {
    pub fn new(step: &'static str, status: StepStatus, message: impl Into<String>) -> Self {
        VerificationStep {
            step,
            status,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    pub bonus: f64,
    pub balance: f64,
    pub verified: bool,
    pub device_verified: bool,
    pub steps: Vec<VerificationStep>,
}

/// Display-only status; a stale channel check degrades a verified user to
/// pending without touching the paid bonus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Verified,
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Verified => "verified",
            UserStatus::Pending => "pending",
        }
    }
}

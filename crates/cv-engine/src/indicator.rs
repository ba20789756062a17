//! Trust indicator shown for a tab

use serde::Serialize;

use crate::state::VerificationState;

/// Icon shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Indicator {
    Default,
    Processing,
    Valid,
    WarningRisk,
    WarningTimeout,
    Failure,
}

impl From<VerificationState> for Indicator {
    fn from(state: VerificationState) -> Self {
        match state {
            VerificationState::Start | VerificationState::Ignore => Indicator::Default,
            VerificationState::Processing => Indicator::Processing,
            VerificationState::Valid => Indicator::Valid,
            VerificationState::Risk => Indicator::WarningRisk,
            VerificationState::Timeout => Indicator::WarningTimeout,
            VerificationState::Invalid => Indicator::Failure,
        }
    }
}

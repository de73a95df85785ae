use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::faucet::{Coordinator, CoordinatorError, DisbursementOutcome};
use crate::utils::{format_wait, now_epoch_seconds};

const UI_DEFINITIONS_YAML: &str = include_str!("../config/ui_definitions.yaml");

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UiDefinitions {
    pub labels: HashMap<String, String>,
}

impl UiDefinitions {
    pub fn load() -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(UI_DEFINITIONS_YAML)
    }

    fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.labels.get(key).map(String::as_str).unwrap_or(key)
    }
}

/// A rendered answer. Ephemeral replies are only shown to the requester
/// where the platform supports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub ephemeral: bool,
}

/// The part both chat surfaces share: call the coordinator, turn its
/// result into text.
pub struct FaucetFrontend {
    coordinator: Arc<Coordinator>,
    ui: UiDefinitions,
    payout: String,
}

impl FaucetFrontend {
    /// `payout` is the human-readable amount, e.g. `100 coin`.
    pub fn new(coordinator: Arc<Coordinator>, ui: UiDefinitions, payout: impl Into<String>) -> Self {
        FaucetFrontend {
            coordinator,
            ui,
            payout: payout.into(),
        }
    }

    pub async fn handle(&self, requester: &str, address: Option<&str>) -> Reply {
        let address = match address.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => address,
            None => return self.usage(),
        };

        let result = self.coordinator.request_disbursement(requester, address, now_epoch_seconds()).await;
        self.render(&result, address)
    }

    pub fn usage(&self) -> Reply {
        Reply {
            text: self.ui.label("usage").to_string(),
            ephemeral: true,
        }
    }

    /// Private acknowledgement for surfaces that announce admissions publicly
    /// in a separate message.
    pub fn admitted_notice(&self) -> String {
        self.ui.label("admitted_notice").to_string()
    }

    pub fn render(&self, result: &Result<DisbursementOutcome, CoordinatorError>, address: &str) -> Reply {
        let window = format_wait(self.coordinator.policy().cooldown_window);
        let fill = |key: &str, tx_hash: &str, retry_after: Option<Duration>| {
            self.ui
                .label(key)
                .replace("{amount}", &self.payout)
                .replace("{address}", address)
                .replace("{tx_hash}", tx_hash)
                .replace("{window}", &window)
                .replace("{retry_after}", &retry_after.map(format_wait).unwrap_or_default())
        };

        match result {
            Ok(DisbursementOutcome::Admitted { tx_hash }) => Reply {
                text: fill("admitted", tx_hash.as_str(), None),
                ephemeral: false,
            },
            Ok(DisbursementOutcome::Denied { retry_after }) => Reply {
                text: fill("denied", "", Some(*retry_after)),
                ephemeral: true,
            },
            Ok(DisbursementOutcome::InvalidAddress) => Reply {
                text: fill("invalid_address", "", None),
                ephemeral: true,
            },
            Ok(DisbursementOutcome::SubmissionFailed { .. }) => Reply {
                text: fill("submission_failed", "", None),
                ephemeral: true,
            },
            Err(CoordinatorError::StorageUnavailable(_)) => Reply {
                text: fill("storage_unavailable", "", None),
                ephemeral: true,
            },
            Err(CoordinatorError::CommitFailed { tx_hash, .. }) => Reply {
                text: fill("commit_failed", tx_hash.as_str(), None),
                ephemeral: true,
            },
        }
    }
}

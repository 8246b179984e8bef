use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Rejected,
}

/// One reward-ledger entry. Reward entries (signup, referral, gift) are
/// created completed; real withdrawals start pending and transition once.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transaction {
    pub tx_id: String,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub upi: String,
    pub status: TxStatus,
    pub date: chrono::NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utr: Option<String>,
}

impl Transaction {
    pub fn reward(tx_id: String, user_id: String, name: String, amount: f64) -> Self {
        Transaction {
            tx_id,
            user_id,
            name,
            amount,
            upi: "-".to_string(),
            status: TxStatus::Completed,
            date: chrono::Utc::now().naive_utc(),
            utr: None,
        }
    }

    pub fn withdrawal(tx_id: String, user_id: String, name: String, amount: f64, upi: String) -> Self {
        Transaction {
            tx_id,
            user_id,
            name,
            amount,
            upi,
            status: TxStatus::Pending,
            date: chrono::Utc::now().naive_utc(),
            utr: None,
        }
    }

    /// Reward entries never enter the admin withdrawal queue.
    pub fn is_reward(&self) -> bool {
        self.tx_id.starts_with("BONUS-")
            || self.tx_id.starts_with("REF-")
            || self.tx_id.starts_with("GIFT-")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewWithdrawal {
    pub user_id: String,
    pub amount: f64,
    pub upi: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_prefixes_stay_out_of_the_admin_queue() {
        for tx_id in ["BONUS-A1B2C", "REF-VERIFY-XY12Z", "GIFT-QQ12W"] {
            let tx = Transaction::reward(
                tx_id.to_string(),
                "1".to_string(),
                "Signup Bonus".to_string(),
                50.0,
            );
            assert!(tx.is_reward());
            assert_eq!(tx.status, TxStatus::Completed);
        }

        let withdrawal = Transaction::withdrawal(
            "A1B2C".to_string(),
            "1".to_string(),
            "User 1".to_string(),
            150.0,
            "name@bank".to_string(),
        );
        assert!(!withdrawal.is_reward());
        assert_eq!(withdrawal.status, TxStatus::Pending);
    }
}

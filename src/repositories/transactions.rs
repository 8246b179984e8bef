use std::sync::Arc;

use crate::models::transactions::{Transaction, TxStatus};
use crate::repositories::store::Store;

#[derive(Clone)]
pub struct TransactionRepository {
    store: Arc<Store>,
}

impl TransactionRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn append(&self, tx: Transaction) {
        self.store.append_transaction(tx).await;
    }

    /// Newest-first slice of one user's history.
    pub async fn history(&self, user_id: &str, limit: usize) -> Vec<Transaction> {
        let mut entries: Vec<Transaction> = self
            .store
            .ledger_snapshot()
            .await
            .into_iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        entries.reverse();
        entries.truncate(limit);
        entries
    }

    /// Real withdrawals only (reward entries filtered out), newest first,
    /// plus the pending count for the admin header.
    pub async fn withdrawal_queue(&self) -> (Vec<Transaction>, usize) {
        let mut entries: Vec<Transaction> = self
            .store
            .ledger_snapshot()
            .await
            .into_iter()
            .filter(|t| !t.is_reward())
            .collect();
        entries.reverse();
        let pending = entries
            .iter()
            .filter(|t| t.status == TxStatus::Pending)
            .count();
        (entries, pending)
    }

    pub async fn find(&self, tx_id: &str) -> Option<Transaction> {
        self.store.find_transaction(tx_id).await
    }

    /// pending -> completed/rejected, once. None when the record is
    /// unknown or already resolved.
    pub async fn resolve(
        &self,
        tx_id: &str,
        status: TxStatus,
        utr: Option<String>,
    ) -> Option<Transaction> {
        self.store.transition_transaction(tx_id, status, utr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_hides_reward_entries_and_counts_pending() {
        let store = Store::in_memory();
        let repository = TransactionRepository::new(store.clone());

        repository
            .append(Transaction::reward(
                "BONUS-A1B2C".to_string(),
                "1".to_string(),
                "Signup Bonus".to_string(),
                50.0,
            ))
            .await;
        repository
            .append(Transaction::withdrawal(
                "XY12Z".to_string(),
                "1".to_string(),
                "User 1".to_string(),
                150.0,
                "name@bank".to_string(),
            ))
            .await;
        repository
            .append(Transaction::reward(
                "GIFT-QQ12W".to_string(),
                "2".to_string(),
                "Gift Code Reward".to_string(),
                12.5,
            ))
            .await;

        let (queue, pending) = repository.withdrawal_queue().await;
        assert_eq!(pending, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].tx_id, "XY12Z");
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let store = Store::in_memory();
        let repository = TransactionRepository::new(store.clone());

        for i in 0..12 {
            repository
                .append(Transaction::reward(
                    format!("GIFT-{:05}", i),
                    "1".to_string(),
                    "Gift Code Reward".to_string(),
                    1.0,
                ))
                .await;
        }
        repository
            .append(Transaction::reward(
                "BONUS-OTHER".to_string(),
                "2".to_string(),
                "Signup Bonus".to_string(),
                50.0,
            ))
            .await;

        let history = repository.history("1", 10).await;
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].tx_id, "GIFT-00011");
        assert!(history.iter().all(|t| t.user_id == "1"));
    }
}

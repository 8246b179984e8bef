use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::bot_settings::BotSettings;
use crate::models::gifts::GiftCode;
use crate::models::leaderboard::Leaderboard;
use crate::models::transactions::{Transaction, TxStatus};
use crate::models::users::User;

const USERS_FILE: &str = "users.json";
const SETTINGS_FILE: &str = "settings.json";
const WITHDRAWALS_FILE: &str = "withdrawals.json";
const GIFTS_FILE: &str = "gifts.json";
const LEADERBOARD_FILE: &str = "leaderboard.json";

/// In-process document store, persisted as one JSON file per collection.
///
/// Keyed collections live in `DashMap`s; an entry guard gives each user and
/// each gift code an atomic read-modify-write section, which is what the
/// referral and gift-claim invariants rely on. The ledger is append-only
/// except for the single withdrawal status transition. Secondary indexes
/// (`device_id -> user_id`, `refer_code -> user_id`) are maintained next to
/// the primary records.
pub struct Store {
    data_dir: Option<PathBuf>,
    users: DashMap<String, User>,
    gifts: DashMap<String, GiftCode>,
    ledger: RwLock<Vec<Transaction>>,
    settings: RwLock<BotSettings>,
    leaderboard: RwLock<Leaderboard>,
    device_index: DashMap<String, String>,
    refer_index: DashMap<String, String>,
}

impl Store {
    pub fn open(data_dir: &Path) -> Result<Arc<Self>, anyhow::Error> {
        std::fs::create_dir_all(data_dir)?;

        let users: Vec<User> = load_collection(data_dir, USERS_FILE).unwrap_or_default();
        let gifts: Vec<GiftCode> = load_collection(data_dir, GIFTS_FILE).unwrap_or_default();
        let ledger: Vec<Transaction> =
            load_collection(data_dir, WITHDRAWALS_FILE).unwrap_or_default();
        let settings: BotSettings = load_collection(data_dir, SETTINGS_FILE).unwrap_or_default();
        let leaderboard: Leaderboard =
            load_collection(data_dir, LEADERBOARD_FILE).unwrap_or_default();

        let store = Store {
            data_dir: Some(data_dir.to_path_buf()),
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            gifts: gifts.into_iter().map(|g| (g.code.clone(), g)).collect(),
            ledger: RwLock::new(ledger),
            settings: RwLock::new(settings),
            leaderboard: RwLock::new(leaderboard),
            device_index: DashMap::new(),
            refer_index: DashMap::new(),
        };
        store.rebuild_indexes();

        // Older settings documents pick up new fields through serde
        // defaults; writing the migrated form back happens once, here.
        store.persist_settings_blocking();
        Ok(Arc::new(store))
    }

    /// Store without a backing directory, for tests.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Store {
            data_dir: None,
            users: DashMap::new(),
            gifts: DashMap::new(),
            ledger: RwLock::new(Vec::new()),
            settings: RwLock::new(BotSettings::default()),
            leaderboard: RwLock::new(Leaderboard::default()),
            device_index: DashMap::new(),
            refer_index: DashMap::new(),
        })
    }

    fn rebuild_indexes(&self) {
        for user in self.users.iter() {
            self.refer_index
                .insert(user.refer_code.clone(), user.id.clone());
            if user.device_verified {
                if let Some(device_id) = &user.device_id {
                    self.device_index.insert(device_id.clone(), user.id.clone());
                }
            }
        }
    }

    // ---- users ----

    pub fn insert_user(&self, user: User) {
        self.refer_index
            .insert(user.refer_code.clone(), user.id.clone());
        self.users.insert(user.id.clone(), user);
        self.save_users();
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.clone())
    }

    /// Atomic read-modify-write of one user record. The closure runs under
    /// the record's entry guard; the snapshot is persisted after the guard
    /// is released.
    pub fn with_user_mut<R>(&self, id: &str, f: impl FnOnce(&mut User) -> R) -> Option<R> {
        let result = {
            let mut entry = self.users.get_mut(id)?;
            f(entry.value_mut())
        };
        self.save_users();
        Some(result)
    }

    pub fn users_snapshot(&self) -> Vec<User> {
        self.users.iter().map(|u| u.clone()).collect()
    }

    pub fn refer_code_taken(&self, code: &str) -> bool {
        self.refer_index.contains_key(code)
    }

    pub fn resolve_refer_code(&self, code: &str) -> Option<String> {
        self.refer_index.get(code).map(|id| id.clone())
    }

    /// Owner lookup for a device fingerprint. Only device-verified users
    /// are indexed, so an unfinished verification never blocks others.
    pub fn device_owner(&self, fingerprint: &str) -> Option<String> {
        self.device_index.get(fingerprint).map(|id| id.clone())
    }

    pub fn register_device(&self, fingerprint: &str, user_id: &str) {
        self.device_index
            .insert(fingerprint.to_string(), user_id.to_string());
    }

    // ---- gifts ----

    pub fn insert_gift(&self, gift: GiftCode) {
        self.gifts.insert(gift.code.clone(), gift);
        self.save_gifts();
    }

    pub fn contains_gift(&self, code: &str) -> bool {
        self.gifts.contains_key(code)
    }

    pub fn get_gift(&self, code: &str) -> Option<GiftCode> {
        self.gifts.get(code).map(|g| g.clone())
    }

    /// Atomic read-modify-write of one gift code; claims race on this
    /// guard, which is what keeps `used_by` under the usage cap.
    pub fn with_gift_mut<R>(&self, code: &str, f: impl FnOnce(&mut GiftCode) -> R) -> Option<R> {
        let result = {
            let mut entry = self.gifts.get_mut(code)?;
            f(entry.value_mut())
        };
        self.save_gifts();
        Some(result)
    }

    pub fn for_each_gift_mut(&self, mut f: impl FnMut(&mut GiftCode) -> bool) {
        let mut changed = false;
        for mut entry in self.gifts.iter_mut() {
            changed |= f(entry.value_mut());
        }
        if changed {
            self.save_gifts();
        }
    }

    pub fn remove_gift(&self, code: &str) -> bool {
        let removed = self.gifts.remove(code).is_some();
        if removed {
            self.save_gifts();
        }
        removed
    }

    pub fn gifts_snapshot(&self) -> Vec<GiftCode> {
        self.gifts.iter().map(|g| g.clone()).collect()
    }

    // ---- ledger ----

    pub async fn append_transaction(&self, tx: Transaction) {
        let snapshot = {
            let mut ledger = self.ledger.write().await;
            ledger.push(tx);
            ledger.clone()
        };
        self.persist(WITHDRAWALS_FILE, &snapshot);
    }

    pub async fn ledger_snapshot(&self) -> Vec<Transaction> {
        self.ledger.read().await.clone()
    }

    /// Single allowed in-place ledger update: a pending record moves to
    /// completed or rejected exactly once. Returns the updated record, or
    /// None when the id is unknown or the record already left pending.
    pub async fn transition_transaction(
        &self,
        tx_id: &str,
        status: TxStatus,
        utr: Option<String>,
    ) -> Option<Transaction> {
        let (updated, snapshot) = {
            let mut ledger = self.ledger.write().await;
            let updated = ledger.iter_mut().find(|t| t.tx_id == tx_id).and_then(|t| {
                if t.status != TxStatus::Pending {
                    return None;
                }
                t.status = status;
                t.utr = utr;
                Some(t.clone())
            });
            (updated, ledger.clone())
        };
        if updated.is_some() {
            self.persist(WITHDRAWALS_FILE, &snapshot);
        }
        updated
    }

    pub async fn find_transaction(&self, tx_id: &str) -> Option<Transaction> {
        self.ledger
            .read()
            .await
            .iter()
            .find(|t| t.tx_id == tx_id)
            .cloned()
    }

    // ---- settings ----

    pub async fn settings(&self) -> BotSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, f: impl FnOnce(&mut BotSettings)) -> BotSettings {
        let snapshot = {
            let mut settings = self.settings.write().await;
            f(&mut settings);
            settings.clone()
        };
        self.persist(SETTINGS_FILE, &snapshot);
        snapshot
    }

    fn persist_settings_blocking(&self) {
        if let Ok(settings) = self.settings.try_read() {
            self.persist(SETTINGS_FILE, &*settings);
        }
    }

    // ---- leaderboard ----

    pub async fn leaderboard(&self) -> Leaderboard {
        self.leaderboard.read().await.clone()
    }

    pub async fn set_leaderboard(&self, leaderboard: Leaderboard) {
        {
            let mut cached = self.leaderboard.write().await;
            *cached = leaderboard.clone();
        }
        self.persist(LEADERBOARD_FILE, &leaderboard);
    }

    // ---- persistence ----

    fn save_users(&self) {
        self.persist(USERS_FILE, &self.users_snapshot());
    }

    fn save_gifts(&self) {
        self.persist(GIFTS_FILE, &self.gifts_snapshot());
    }

    /// Write-through is best effort: the in-memory state stays
    /// authoritative and a failed write never rolls a mutation back.
    fn persist<T: Serialize>(&self, file: &str, value: &T) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let path = dir.join(file);
        match serde_json::to_string_pretty(value) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    log::error!("Error saving {}: {}", path.display(), e);
                }
            }
            Err(e) => log::error!("Error serializing {}: {}", file, e),
        }
    }
}

fn load_collection<T: DeserializeOwned>(dir: &Path, file: &str) -> Option<T> {
    let path = dir.join(file);
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Error loading {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::error!("Error loading {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::User;

    fn sample_user(id: &str, code: &str) -> User {
        User::new(id.to_string(), format!("User {}", id), None, code.to_string(), None)
    }

    #[tokio::test]
    async fn entry_guard_serializes_concurrent_credits() {
        let store = Store::in_memory();
        store.insert_user(sample_user("1", "AAAAAAA"));

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let _ = store.with_user_mut("1", |u| u.balance += 1.0);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get_user("1").unwrap().balance, 50.0);
    }

    #[tokio::test]
    async fn refer_index_resolves_after_insert() {
        let store = Store::in_memory();
        store.insert_user(sample_user("7", "REF1234"));

        assert!(store.refer_code_taken("REF1234"));
        assert_eq!(store.resolve_refer_code("REF1234").as_deref(), Some("7"));
        assert_eq!(store.resolve_refer_code("NOPE"), None);
    }

    #[tokio::test]
    async fn transaction_transition_happens_once() {
        let store = Store::in_memory();
        store
            .append_transaction(Transaction::withdrawal(
                "AB12C".to_string(),
                "1".to_string(),
                "User 1".to_string(),
                150.0,
                "a@bank".to_string(),
            ))
            .await;

        let first = store
            .transition_transaction("AB12C", TxStatus::Rejected, None)
            .await;
        assert_eq!(first.unwrap().status, TxStatus::Rejected);

        // Already resolved: both a second rejection and a completion are
        // refused.
        assert!(store
            .transition_transaction("AB12C", TxStatus::Rejected, None)
            .await
            .is_none());
        assert!(store
            .transition_transaction("AB12C", TxStatus::Completed, Some("UTR".into()))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn files_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("earnbot-store-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        {
            let store = Store::open(&dir).unwrap();
            store.insert_user(sample_user("42", "ZZZZZZZ"));
            store
                .update_settings(|s| s.min_withdrawal = 250.0)
                .await;
        }

        let reopened = Store::open(&dir).unwrap();
        assert_eq!(reopened.get_user("42").unwrap().refer_code, "ZZZZZZZ");
        assert_eq!(reopened.settings().await.min_withdrawal, 250.0);
        assert_eq!(reopened.resolve_refer_code("ZZZZZZZ").as_deref(), Some("42"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

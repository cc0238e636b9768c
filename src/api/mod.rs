//! Data access layer for tournament records
//!
//! Maps tournaments and their player rosters onto the coordination store:
//! one node per tournament under the root path, one child node per player,
//! JSON payloads. Mutations run under per-tournament exclusive locks with
//! an optimistic version check; reads take the shared lock so a concurrent
//! update is never observed mid-write.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::store::{CoordinationStore, LockMode, TxnOp};

/// Default root path for tournament nodes.
pub const DEFAULT_ROOT_PATH: &str = "/tournd";

/// Match-status symbols allowed in a classification string.
pub const MATCH_UNPLAYED: char = 'U';
pub const MATCH_SLOT1_WON: char = '1';
pub const MATCH_SLOT2_WON: char = '2';

/// Days a tournament is kept before its advisory deletion date.
const RETENTION_DAYS: i64 = 30;

/// Player child nodes are `p` + 10-digit sequence number. Anything else
/// among a tournament's children (lock artifacts in particular) is not a
/// player.
static PLAYER_NODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^p\d{10}$").unwrap());

/// Tournament node names under the root.
static TOURNAMENT_NODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^t\d{10}$").unwrap());

/// Tournament node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub name: String,
    pub modality: u32,
    pub password: String,
    pub classification: String,
    /// Advisory only: stored at creation, never read back by any component.
    pub deletion_date: String,
}

/// Player node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    pub points: u32,
    pub disqualified: bool,
    pub wins: u32,
    pub losses: u32,
}

impl PlayerRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            points: 0,
            disqualified: false,
            wins: 0,
            losses: 0,
        }
    }
}

/// Full tournament view returned by [`DataApi::get_tournament`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentInfo {
    pub name: String,
    pub modality: u32,
    pub classification: String,
    pub version: u64,
    pub players: Vec<PlayerRecord>,
}

/// One entry of [`DataApi::get_tournament_list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentSummary {
    pub id: u64,
    pub name: String,
    pub players: usize,
}

/// Tournament lifecycle operations against one store handle.
pub struct DataApi<S> {
    store: Arc<S>,
    root: String,
    lock_timeout: Duration,
}

impl<S: CoordinationStore> DataApi<S> {
    pub fn new(store: Arc<S>, lock_timeout: Duration) -> Self {
        Self {
            store,
            root: DEFAULT_ROOT_PATH.to_string(),
            lock_timeout,
        }
    }

    /// Current root path.
    pub fn root_path(&self) -> &str {
        &self.root
    }

    /// Rebind the root path, creating it if missing.
    pub async fn set_root_path(&mut self, path: &str) -> Result<()> {
        let path = path.trim_end_matches('/');
        self.store.ensure_path(path).await?;
        self.root = path.to_string();
        Ok(())
    }

    fn tournament_path(&self, tournament_id: u64) -> String {
        format!("{}/t{:010}", self.root, tournament_id)
    }

    /// Create a tournament node plus one child per player.
    ///
    /// The tournament node is created first with a store-assigned sequence
    /// number, then the whole roster goes in as a single transaction. If
    /// that transaction fails the tournament node is deleted again, so
    /// either the full subtree exists or nothing does. No lock is taken:
    /// the node is fresh, nobody can contend on it.
    ///
    /// Returns the created tournament's full path.
    pub async fn create_tournament(
        &self,
        name: &str,
        modality: u32,
        password: &str,
        players: &[String],
    ) -> Result<String> {
        if players.is_empty() {
            return Err(Error::MalformedRequest(
                "a tournament needs at least one player".into(),
            ));
        }

        let deletion_date = (Local::now() + chrono::Duration::days(RETENTION_DAYS))
            .format("%d/%m/%Y")
            .to_string();
        let record = TournamentRecord {
            name: name.to_string(),
            modality,
            password: password.to_string(),
            // One match slot per player beyond the first, all unplayed.
            classification: MATCH_UNPLAYED.to_string().repeat(players.len() - 1),
            deletion_date,
        };

        let tournament_path = self
            .store
            .create(
                &format!("{}/t", self.root),
                serde_json::to_vec(&record)?,
                true,
            )
            .await?;

        let mut ops = Vec::with_capacity(players.len());
        for player in players {
            ops.push(TxnOp::Create {
                path: format!("{tournament_path}/p"),
                payload: serde_json::to_vec(&PlayerRecord::new(player))?,
                sequential: true,
            });
        }

        if let Err(err) = self.store.transaction(ops).await {
            tracing::warn!(
                "player transaction failed for {}, rolling back: {}",
                tournament_path,
                err
            );
            self.store.delete_recursive(&tournament_path).await?;
            return Err(Error::StoreError(format!(
                "player creation failed, tournament rolled back: {err}"
            )));
        }

        tracing::info!("created tournament {}", tournament_path);
        Ok(tournament_path)
    }

    /// Delete a tournament and all its player children, gated by password.
    ///
    /// Idempotent: a tournament that is already gone counts as deleted.
    pub async fn delete_tournament(&self, tournament_id: u64, password: &str) -> Result<()> {
        let path = self.tournament_path(tournament_id);
        let _lock = self
            .store
            .lock(&path, LockMode::Exclusive, self.lock_timeout)
            .await?;

        let (payload, _) = match self.store.get(&path).await {
            Ok(found) => found,
            Err(Error::NoSuchNode(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let record: TournamentRecord = serde_json::from_slice(&payload)?;
        if record.password != password {
            return Err(Error::PasswordMismatch);
        }

        self.store.delete_recursive(&path).await?;
        tracing::info!("deleted tournament {}", path);
        Ok(())
    }

    /// Replace the classification string, gated by version and password.
    ///
    /// Symbol validation happens before any lock is taken; the version,
    /// length and password gates run under the exclusive lock against live
    /// data. A stale version means the caller lost the race and must
    /// re-read.
    pub async fn update_tournament(
        &self,
        tournament_id: u64,
        expected_version: u64,
        classification: &str,
        password: &str,
    ) -> Result<()> {
        for symbol in classification.chars() {
            if !matches!(symbol, MATCH_UNPLAYED | MATCH_SLOT1_WON | MATCH_SLOT2_WON) {
                return Err(Error::ClassificationValue(symbol));
            }
        }

        let path = self.tournament_path(tournament_id);
        let _lock = self
            .store
            .lock(&path, LockMode::Exclusive, self.lock_timeout)
            .await?;

        let (payload, stat) = self.store.get(&path).await?;
        if stat.version != expected_version {
            return Err(Error::VersionMismatch {
                expected: expected_version,
                stored: stat.version,
            });
        }

        // Live player count, lock artifacts excluded.
        let players = self
            .store
            .get_children(&path)
            .await?
            .into_iter()
            .filter(|child| PLAYER_NODE.is_match(child))
            .count();
        if classification.len() != players.saturating_sub(1) {
            return Err(Error::ClassificationLength {
                expected: players.saturating_sub(1),
                actual: classification.len(),
            });
        }

        let mut record: TournamentRecord = serde_json::from_slice(&payload)?;
        if record.password != password {
            return Err(Error::PasswordMismatch);
        }

        record.classification = classification.to_string();
        self.store.set(&path, serde_json::to_vec(&record)?).await?;
        // TODO: fold classification changes into per-player wins/losses/points.
        tracing::debug!("updated tournament {}", path);
        Ok(())
    }

    /// Read one tournament with its full roster, under the shared lock.
    pub async fn get_tournament(&self, tournament_id: u64) -> Result<TournamentInfo> {
        let path = self.tournament_path(tournament_id);
        let _lock = self
            .store
            .lock(&path, LockMode::Shared, self.lock_timeout)
            .await?;

        let (payload, stat) = self.store.get(&path).await?;
        let record: TournamentRecord = serde_json::from_slice(&payload)?;

        let mut players = Vec::new();
        for child in self.store.get_children(&path).await? {
            if !PLAYER_NODE.is_match(&child) {
                continue;
            }
            let (player_payload, _) = self.store.get(&format!("{path}/{child}")).await?;
            players.push(serde_json::from_slice(&player_payload)?);
        }

        Ok(TournamentInfo {
            name: record.name,
            modality: record.modality,
            classification: record.classification,
            version: stat.version,
            players,
        })
    }

    /// Advisory snapshot of every tournament under the root: id, name and
    /// player count. No locking, tolerant of concurrent mutation.
    pub async fn get_tournament_list(&self) -> Result<Vec<TournamentSummary>> {
        let mut summaries = Vec::new();
        for child in self.store.get_children(&self.root).await? {
            if !TOURNAMENT_NODE.is_match(&child) {
                continue;
            }
            let path = format!("{}/{child}", self.root);
            // A tournament deleted between enumeration and read is skipped.
            let (payload, _) = match self.store.get(&path).await {
                Ok(found) => found,
                Err(Error::NoSuchNode(_)) => continue,
                Err(err) => return Err(err),
            };
            let record: TournamentRecord = serde_json::from_slice(&payload)?;
            let players = self
                .store
                .get_children(&path)
                .await?
                .into_iter()
                .filter(|name| PLAYER_NODE.is_match(name))
                .count();

            let id = child[1..]
                .parse::<u64>()
                .map_err(|_| Error::Other(format!("bad tournament node name: {child}")))?;
            summaries.push(TournamentSummary {
                id,
                name: record.name,
                players,
            });
        }
        Ok(summaries)
    }
}

/// Extract the numeric tournament id from a full node path.
pub fn id_from_path(path: &str) -> Option<u64> {
    let name = path.rsplit('/').next()?;
    if !TOURNAMENT_NODE.is_match(name) {
        return None;
    }
    name[1..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tournament_path_is_zero_padded() {
        let api = DataApi::new(
            Arc::new(crate::store::memory::MemoryStore::new()),
            Duration::from_millis(500),
        );
        assert_eq!(api.tournament_path(42), "/tournd/t0000000042");
    }

    #[test]
    fn test_id_from_path() {
        assert_eq!(id_from_path("/tournd/t0000000042"), Some(42));
        assert_eq!(id_from_path("/tournd/t42"), None);
        assert_eq!(id_from_path("/tournd/lock-0000000001"), None);
    }

    #[test]
    fn test_player_node_filter() {
        assert!(PLAYER_NODE.is_match("p0000000003"));
        assert!(!PLAYER_NODE.is_match("lock-0000000000"));
        assert!(!PLAYER_NODE.is_match("rlock-0000000000"));
        assert!(!PLAYER_NODE.is_match("p123"));
    }

    #[test]
    fn test_payload_field_names() {
        let record = TournamentRecord {
            name: "Open".into(),
            modality: 0,
            password: "pw".into(),
            classification: "UU".into(),
            deletion_date: "01/01/2027".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        for field in ["name", "modality", "password", "classification", "deletion_date"] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }
}

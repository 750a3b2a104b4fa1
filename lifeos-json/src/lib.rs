use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lifeos_core::{
    memory::StoreTables, AccessControl, CardEntry, CardId, CardLearningState, CardStore, CoreError,
    Flashcard, ProjectId, UserId, Versioned,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, error};

pub mod paths;

const FILE_VERSION: u32 = 2;
const DEFAULT_BACKUPS: usize = 10;

#[derive(Clone, Serialize, Deserialize)]
struct StateRow {
    user_id: UserId,
    card_id: CardId,
    version: u64,
    state: CardLearningState,
}

#[derive(Clone, Serialize, Deserialize)]
struct MemberRow {
    user_id: UserId,
    project_id: ProjectId,
}

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cards: Vec<Flashcard>,
    states: Vec<StateRow>,
    members: Vec<MemberRow>,
}

#[derive(Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tables: StoreTables,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            tables: StoreTables::default(),
        }
    }

    fn to_image(&self) -> FileImage {
        let mut cards: Vec<Flashcard> = self.tables.cards.values().cloned().collect();
        cards.sort_by_key(|c| (c.created_at, c.id));
        let mut states: Vec<StateRow> = self
            .tables
            .states
            .iter()
            .map(|((user_id, card_id), v)| StateRow {
                user_id: *user_id,
                card_id: *card_id,
                version: v.version,
                state: v.value.clone(),
            })
            .collect();
        states.sort_by_key(|r| (r.user_id, r.card_id));
        let mut members: Vec<MemberRow> = self
            .tables
            .members
            .iter()
            .map(|(user_id, project_id)| MemberRow {
                user_id: *user_id,
                project_id: *project_id,
            })
            .collect();
        members.sort_by_key(|m| (m.user_id, m.project_id));
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            cards,
            states,
            members,
        }
    }

    fn from_image(img: FileImage) -> Self {
        let mut tables = StoreTables::default();
        for c in img.cards {
            tables.insert_card(c);
        }
        for r in img.states {
            if tables.cards.contains_key(&r.card_id) {
                tables
                    .states
                    .insert((r.user_id, r.card_id), Versioned::new(r.state, r.version));
            }
        }
        for m in img.members {
            tables.members.insert((m.user_id, m.project_id));
        }
        Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            tables,
        }
    }
}

pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: RwLock<State>,
    // Held from mutation until the file is written, so files land in order.
    writer: Mutex<()>,
}

impl JsonStore {
    /// Opens the store under `data_dir`, or under the default data root.
    pub async fn open_in(data_dir: Option<&Path>) -> Result<Self, CoreError> {
        let paths = paths::StorePaths::under(&paths::data_root(data_dir));
        Self::open_with(paths.file, paths.backups, DEFAULT_BACKUPS).await
    }

    pub async fn open_with(
        path: PathBuf,
        backups_dir: PathBuf,
        max_backups: usize,
    ) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let max_backups = max_backups.max(1);
        let state = load_or_init(&path, &backups_dir, max_backups).await?;
        Ok(Self {
            path,
            backups_dir,
            max_backups,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    /// Applies `change` and writes the result to disk. If the write fails the
    /// in-memory tables are put back as they were.
    async fn commit<T, F>(&self, change: F) -> Result<T, CoreError>
    where
        T: Send,
        F: FnOnce(&mut StoreTables) -> Result<T, CoreError> + Send,
    {
        let _writer = self.writer.lock().await;
        let (out, previous, snapshot) = {
            let mut s = self.state.write();
            let previous = (*s).clone();
            let out = change(&mut s.tables)?;
            s.updated_at = Utc::now();
            (out, previous, s.to_image())
        };
        if let Err(e) = self.write_image(snapshot).await {
            *self.state.write() = previous;
            return Err(e);
        }
        Ok(out)
    }

    async fn write_image(&self, snapshot: FileImage) -> Result<(), CoreError> {
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;

        task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &snapshot))
            .await
            .map_err(|e| {
                error!("json store writer panicked: {e}");
                CoreError::Storage("io")
            })?
            .map_err(io_err)?;
        Ok(())
    }
}

fn io_err(e: io::Error) -> CoreError {
    error!("json store io error: {e}");
    CoreError::Storage("io")
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(io_err)
}

async fn load_or_init(path: &Path, backups_dir: &Path, keep: usize) -> Result<State, CoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let img: FileImage = task::spawn_blocking(move || {
            let buf = fs::read_to_string(&p)?;
            let v = serde_json::from_str::<FileImage>(&buf)?;
            Ok::<FileImage, io::Error>(v)
        })
        .await
        .map_err(|_| CoreError::Storage("io"))?
        .map_err(io_err)?;
        if img.version != FILE_VERSION {
            return Err(CoreError::Storage("unsupported store file version"));
        }
        debug!(path = %path.display(), cards = img.cards.len(), "loaded json store");
        Ok(State::from_image(img))
    } else {
        let st = State::new_empty();
        let img = st.to_image();
        write_with_backup(path, backups_dir, keep, &img).map_err(io_err)?;
        Ok(st)
    }
}

fn write_with_backup(
    path: &Path,
    backups_dir: &Path,
    max_backups: usize,
    img: &FileImage,
) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(backups_dir)?;

    let json = serde_json::to_vec_pretty(img)?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Backup rotation
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let backup_path = backups_dir.join(format!("recall-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(&json)?;
    btmp.flush()?;
    btmp.persist(&backup_path).map_err(|e| e.error)?;

    rotate_backups(backups_dir, max_backups)
}

fn rotate_backups(dir: &Path, keep: usize) -> Result<(), io::Error> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    // Backup names embed their timestamp, so name order is age order.
    entries.sort_by_key(|e| e.file_name());
    if entries.len() > keep {
        for e in &entries[0..entries.len() - keep] {
            let _ = fs::remove_file(e.path());
        }
    }
    Ok(())
}

#[async_trait]
impl CardStore for JsonStore {
    async fn add_card(
        &self,
        project_id: ProjectId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<Flashcard, CoreError> {
        let mut card = Flashcard::new(project_id, front, back, created_at);
        card.hint = hint.map(|s| s.to_string());
        card.tags = tags.to_vec();
        let stored = card.clone();
        self.commit(move |t| {
            t.insert_card(stored);
            Ok(())
        })
        .await?;
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Flashcard, CoreError> {
        self.state.read().tables.get_card(id)
    }

    async fn list_cards(&self, project_id: Option<ProjectId>) -> Result<Vec<Flashcard>, CoreError> {
        Ok(self.state.read().tables.list_cards(project_id))
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.commit(|t| t.delete_card(id)).await
    }

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Versioned<CardLearningState>, CoreError> {
        Ok(self.state.read().tables.get_state(user_id, card_id))
    }

    async fn put_state(
        &self,
        user_id: UserId,
        card_id: CardId,
        expected_version: u64,
        state: &CardLearningState,
    ) -> Result<u64, CoreError> {
        self.commit(|t| t.put_state(user_id, card_id, expected_version, state))
            .await
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<CardEntry>, CoreError> {
        Ok(self.state.read().tables.list_entries(user_id, project_id))
    }
}

#[async_trait]
impl AccessControl for JsonStore {
    async fn has_access(&self, user_id: UserId, project_id: ProjectId) -> Result<bool, CoreError> {
        Ok(self.state.read().tables.members.contains(&(user_id, project_id)))
    }

    async fn grant(&self, user_id: UserId, project_id: ProjectId) -> Result<(), CoreError> {
        if self.has_access(user_id, project_id).await? {
            return Ok(());
        }
        self.commit(|t| {
            t.members.insert((user_id, project_id));
            Ok(())
        })
        .await
    }
}

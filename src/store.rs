//! In-process tables standing in for the relational store.
//!
//! All collections live behind one `RwLock`, so every operation sees one
//! consistent snapshot: lock acquisition is the only suspension point. When a
//! data path is configured the tables are loaded from, and rewritten to, a
//! JSON snapshot after each committed mutation. A mutation whose snapshot
//! write fails is rolled back, so memory never runs ahead of disk.

use std::{
    collections::{BTreeSet, HashMap},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

use crate::domain::{College, Course, Exercise, KnowledgePoint, Paper, Rule};
use crate::error::{BankError, BankResult};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub colleges: HashMap<String, College>,
    #[serde(default)]
    pub courses: HashMap<String, Course>,
    #[serde(default)]
    pub knowledge_points: HashMap<String, KnowledgePoint>,
    #[serde(default)]
    pub exercises: HashMap<String, Exercise>,
    /// Owner id -> rules in insertion order.
    #[serde(default)]
    pub rules: HashMap<String, Vec<Rule>>,
    #[serde(default)]
    pub papers: HashMap<String, Paper>,
    /// User id -> bookmarked exercise ids.
    #[serde(default)]
    pub bookmarks: HashMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub next_seq: u64,
}

impl Tables {
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn knowledge_point(&self, id: &str) -> BankResult<&KnowledgePoint> {
        self.knowledge_points
            .get(id)
            .ok_or_else(|| BankError::NotFound(format!("no knowledge point with id '{}'", id)))
    }

    pub fn exercise(&self, id: &str) -> BankResult<&Exercise> {
        self.exercises
            .get(id)
            .ok_or_else(|| BankError::NotFound(format!("no exercise with id '{}'", id)))
    }

    pub fn course(&self, id: &str) -> BankResult<&Course> {
        self.courses
            .get(id)
            .ok_or_else(|| BankError::NotFound(format!("no course with id '{}'", id)))
    }

    pub fn college_by_slug(&self, slug: &str) -> Option<&College> {
        self.colleges.values().find(|c| c.slug == slug)
    }

    /// Caller's paper, or not-found. Someone else's paper is reported the same way.
    pub fn owned_paper_mut(&mut self, owner_id: &str, paper_id: &str) -> BankResult<&mut Paper> {
        match self.papers.get_mut(paper_id) {
            Some(p) if p.owner_id == owner_id => Ok(p),
            _ => Err(BankError::NotFound(format!("no paper with id '{}'", paper_id))),
        }
    }

    /// Remove an exercise and every reference to it.
    pub fn purge_exercise(&mut self, id: &str) {
        self.exercises.remove(id);
        for paper in self.papers.values_mut() {
            paper.exercise_ids.retain(|e| e != id);
        }
        for marks in self.bookmarks.values_mut() {
            marks.remove(id);
        }
    }

    /// Remove a knowledge point, its exercises, and rules that target it.
    pub fn purge_knowledge_point(&mut self, id: &str) {
        let exercise_ids: Vec<String> = self
            .exercises
            .values()
            .filter(|e| e.knowledge_point_id == id)
            .map(|e| e.id.clone())
            .collect();
        for eid in exercise_ids {
            self.purge_exercise(&eid);
        }
        for rules in self.rules.values_mut() {
            rules.retain(|r| r.knowledge_point_id.as_deref() != Some(id));
        }
        self.knowledge_points.remove(id);
    }

    pub fn purge_course(&mut self, id: &str) {
        let kp_ids: Vec<String> = self
            .knowledge_points
            .values()
            .filter(|k| k.course_id == id)
            .map(|k| k.id.clone())
            .collect();
        for kid in kp_ids {
            self.purge_knowledge_point(&kid);
        }
        self.courses.remove(id);
    }

    pub fn purge_college(&mut self, id: &str) {
        let course_ids: Vec<String> = self
            .courses
            .values()
            .filter(|c| c.college_id == id)
            .map(|c| c.id.clone())
            .collect();
        for cid in course_ids {
            self.purge_course(&cid);
        }
        self.colleges.remove(id);
    }
}

pub struct Store {
    tables: RwLock<Tables>,
    data_path: Option<PathBuf>,
}

impl Store {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self { tables: RwLock::new(Tables::default()), data_path: None }
    }

    /// Open the store, loading the snapshot if one exists at `data_path`.
    #[instrument(level = "info")]
    pub async fn open(data_path: Option<PathBuf>) -> BankResult<Self> {
        let tables = match &data_path {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let t: Tables = serde_json::from_slice(&bytes)?;
                    info!(
                        target: "exercise_bank",
                        path = %path.display(),
                        colleges = t.colleges.len(),
                        exercises = t.exercises.len(),
                        papers = t.papers.len(),
                        "Loaded store snapshot"
                    );
                    t
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!(target: "exercise_bank", path = %path.display(), "No snapshot yet; starting empty");
                    Tables::default()
                }
                Err(e) => return Err(e.into()),
            },
            None => Tables::default(),
        };
        Ok(Self { tables: RwLock::new(tables), data_path })
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().await
    }

    /// Exclusive access for a mutation. Changes must be persisted with
    /// [`WriteTxn::commit`]; a failed commit restores the tables as they were
    /// when the lock was taken.
    pub async fn write(&self) -> WriteTxn<'_> {
        let guard = self.tables.write().await;
        let before = self.data_path.as_ref().map(|_| guard.clone());
        WriteTxn { guard, before, data_path: self.data_path.as_deref() }
    }
}

async fn persist(path: &Path, tables: &Tables) -> BankResult<()> {
    let bytes = serde_json::to_vec(tables)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(target: "exercise_bank", path = %path.display(), bytes = bytes.len(), "Snapshot written");
    Ok(())
}

/// Write guard over the tables plus the state to return to if persisting fails.
pub struct WriteTxn<'a> {
    guard: RwLockWriteGuard<'a, Tables>,
    before: Option<Tables>,
    data_path: Option<&'a Path>,
}

impl WriteTxn<'_> {
    /// Persist the tables. On failure the mutation is undone and the error returned.
    pub async fn commit(&mut self) -> BankResult<()> {
        let Some(path) = self.data_path else {
            return Ok(());
        };
        match persist(path, &self.guard).await {
            Ok(()) => {
                self.before = None;
                Ok(())
            }
            Err(e) => {
                if let Some(before) = self.before.take() {
                    *self.guard = before;
                }
                warn!(target: "exercise_bank", path = %path.display(), error = ?e, "Snapshot write failed; mutation rolled back");
                Err(e)
            }
        }
    }
}

impl Deref for WriteTxn<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.guard
    }
}

impl DerefMut for WriteTxn<'_> {
    fn deref_mut(&mut self) -> &mut Tables {
        &mut self.guard
    }
}

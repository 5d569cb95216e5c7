use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::Result;
use crate::lessons::Lesson;
use crate::types::{ChatId, OriginatorId, Profile};

/// A person known to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: OriginatorId,
    pub name: String,
    pub username: Option<String>,
    pub chat: ChatId,
}

impl User {
    pub fn from_profile(profile: &Profile, chat: ChatId) -> Self {
        Self {
            id: profile.id,
            name: profile.full_name(),
            username: profile.username.clone(),
            chat,
        }
    }

    pub fn is_admin(&self, admin_chat: Option<ChatId>) -> bool {
        admin_chat == Some(self.chat)
    }
}

/// A user's request to hear about free spots in a lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub id: u64,
    pub owner: User,
    pub lesson: Lesson,
    pub created_at: DateTime<Utc>,
}

/// Persistence for users and watches.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the stored user with `user.id`, storing `user` first if there
    /// is none.
    async fn find_or_create_user(&self, user: User) -> Result<User>;

    async fn find_user(&self, id: OriginatorId) -> Result<Option<User>>;

    /// Creates a watch for `owner` on `lesson`, or returns the existing one.
    async fn create_watch(&self, owner: &User, lesson: &Lesson) -> Result<Watch>;

    async fn watches_for_user(&self, user: OriginatorId) -> Result<Vec<Watch>>;

    async fn all_watches(&self) -> Result<Vec<Watch>>;

    async fn find_watch(&self, id: u64) -> Result<Option<Watch>>;

    async fn delete_watch(&self, id: u64) -> Result<bool>;

    /// Deletes every watch of `user`, returning how many there were.
    async fn clear_watches(&self, user: OriginatorId) -> Result<usize>;

    async fn delete_watches(&self, ids: &[u64]) -> Result<usize>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<OriginatorId, User>,
    watches: BTreeMap<u64, Watch>,
    next_watch_id: u64,
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_or_create_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.lock();
        Ok(tables.users.entry(user.id).or_insert(user).clone())
    }

    async fn find_user(&self, id: OriginatorId) -> Result<Option<User>> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn create_watch(&self, owner: &User, lesson: &Lesson) -> Result<Watch> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables
            .watches
            .values()
            .find(|watch| watch.owner.id == owner.id && watch.lesson.id == lesson.id)
        {
            return Ok(existing.clone());
        }

        tables.next_watch_id += 1;
        let watch = Watch {
            id: tables.next_watch_id,
            owner: owner.clone(),
            lesson: lesson.clone(),
            created_at: Utc::now(),
        };
        tables.watches.insert(watch.id, watch.clone());
        Ok(watch)
    }

    async fn watches_for_user(&self, user: OriginatorId) -> Result<Vec<Watch>> {
        let tables = self.tables.lock();
        Ok(tables
            .watches
            .values()
            .filter(|watch| watch.owner.id == user)
            .cloned()
            .collect())
    }

    async fn all_watches(&self) -> Result<Vec<Watch>> {
        Ok(self.tables.lock().watches.values().cloned().collect())
    }

    async fn find_watch(&self, id: u64) -> Result<Option<Watch>> {
        Ok(self.tables.lock().watches.get(&id).cloned())
    }

    async fn delete_watch(&self, id: u64) -> Result<bool> {
        Ok(self.tables.lock().watches.remove(&id).is_some())
    }

    async fn clear_watches(&self, user: OriginatorId) -> Result<usize> {
        let mut tables = self.tables.lock();
        let before = tables.watches.len();
        tables.watches.retain(|_, watch| watch.owner.id != user);
        Ok(before - tables.watches.len())
    }

    async fn delete_watches(&self, ids: &[u64]) -> Result<usize> {
        let mut tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter(|&&id| tables.watches.remove(&id).is_some())
            .count())
    }
}

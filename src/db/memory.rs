use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Page, Post, User, UserSession};
use crate::db::{DbResult, PostDirectory, SessionStore, UserDirectory};
use crate::error::DatabaseError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    posts: Vec<Post>,
    sessions: HashMap<String, UserSession>,
}

impl Tables {
    /// Mirrors the unique indexes on `users.username` and `users.email`.
    fn check_unique(&self, user: &User) -> DbResult<()> {
        for other in self.users.values().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(DatabaseError::Duplicate("username".into()));
            }
            if other.email == user.email {
                return Err(DatabaseError::Duplicate("email".into()));
            }
        }
        Ok(())
    }
}

/// In-process store implementing every directory trait. All writes go through
/// one lock, so uniqueness holds even under concurrent registrations.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: &User) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(DatabaseError::Duplicate("id".into()));
        }
        tables.check_unique(user)?;
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn update(&self, user: &User) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(DatabaseError::NotFound);
        }
        tables.check_unique(user)?;
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Err(DatabaseError::NotFound);
        }
        tables.sessions.retain(|_, s| s.user_id != id);
        tables.posts.retain(|p| p.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl PostDirectory for MemoryStore {
    async fn create(&self, post: &Post) -> DbResult<Post> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&post.user_id) {
            return Err(DatabaseError::QueryError("post author does not exist".into()));
        }
        tables.posts.push(post.clone());
        Ok(post.clone())
    }

    async fn page_by_author(&self, user_id: Uuid, page: u32, per_page: u32) -> DbResult<Page<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<&Post> = tables.posts.iter().filter(|p| p.user_id == user_id).collect();
        posts.sort_by(|a, b| b.date_posted.cmp(&a.date_posted));

        let total = posts.len() as u64;
        let items = posts
            .into_iter()
            .skip(Page::<Post>::offset(page, per_page) as usize)
            .take(per_page as usize)
            .cloned()
            .collect();

        Ok(Page { items, page, per_page, total })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &UserSession) -> DbResult<UserSession> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&session.user_id) {
            return Err(DatabaseError::QueryError("session user does not exist".into()));
        }
        if tables.sessions.contains_key(&session.token) {
            return Err(DatabaseError::Duplicate("token".into()));
        }
        tables.sessions.insert(session.token.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_session_by_token(&self, token: &str) -> DbResult<Option<UserSession>> {
        Ok(self.tables.read().await.sessions.get(token).cloned())
    }

    async fn update_session_activity(&self, token: &str) -> DbResult<()> {
        if let Some(session) = self.tables.write().await.sessions.get_mut(token) {
            session.last_activity = Utc::now();
        }
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> DbResult<()> {
        self.tables.write().await.sessions.remove(token);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> DbResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired());
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(name: &str, email: &str) -> User {
        User::new(name.into(), email.into(), "hash".into(), "default.jpg".into())
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let store = MemoryStore::new();
        UserDirectory::create(&store, &user("alice", "alice@x.com")).await.unwrap();

        let err = UserDirectory::create(&store, &user("alice", "other@x.com")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(ref f) if f == "username"));

        let err = UserDirectory::create(&store, &user("bob", "alice@x.com")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(ref f) if f == "email"));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_own_values() {
        let store = MemoryStore::new();
        let mut alice = UserDirectory::create(&store, &user("alice", "alice@x.com")).await.unwrap();
        let bob = UserDirectory::create(&store, &user("bob", "bob@x.com")).await.unwrap();

        alice.image_file = "abc.png".into();
        assert!(store.update(&alice).await.is_ok());

        alice.email = bob.email.clone();
        assert!(matches!(store.update(&alice).await, Err(DatabaseError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let alice = UserDirectory::create(&store, &user("alice", "alice@x.com")).await.unwrap();
        let session = UserSession::new(alice.id, "tok".into(), Duration::hours(1));
        store.create_session(&session).await.unwrap();
        PostDirectory::create(&store, &Post::new(alice.id, "t".into(), "c".into())).await.unwrap();

        store.delete(alice.id).await.unwrap();
        assert_eq!(store.session_count().await, 0);
        assert!(store.get_session_by_token("tok").await.unwrap().is_none());
        assert_eq!(store.page_by_author(alice.id, 1, 5).await.unwrap().total, 0);
        assert!(matches!(store.delete(alice.id).await, Err(DatabaseError::NotFound)));
    }

    #[tokio::test]
    async fn test_posts_are_paged_newest_first() {
        let store = MemoryStore::new();
        let alice = UserDirectory::create(&store, &user("alice", "alice@x.com")).await.unwrap();
        for i in 0..7 {
            let mut post = Post::new(alice.id, format!("post {}", i), "body".into());
            post.date_posted = Utc::now() + Duration::minutes(i);
            PostDirectory::create(&store, &post).await.unwrap();
        }

        let first = store.page_by_author(alice.id, 1, 5).await.unwrap();
        assert_eq!(first.total, 7);
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.items[0].title, "post 6");

        let second = store.page_by_author(alice.id, 2, 5).await.unwrap();
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.items[1].title, "post 0");
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let store = MemoryStore::new();
        let alice = UserDirectory::create(&store, &user("alice", "alice@x.com")).await.unwrap();
        store.create_session(&UserSession::new(alice.id, "old".into(), Duration::seconds(-5))).await.unwrap();
        store.create_session(&UserSession::new(alice.id, "new".into(), Duration::hours(1))).await.unwrap();

        assert_eq!(store.cleanup_expired_sessions().await.unwrap(), 1);
        assert!(store.get_session_by_token("new").await.unwrap().is_some());
    }
}

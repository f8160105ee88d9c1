use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub image_file: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String, image_file: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            image_file,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub date_posted: DateTime<Utc>,
    pub user_id: Uuid,
}

impl Post {
    pub fn new(user_id: Uuid, title: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            content,
            date_posted: Utc::now(),
            user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user_id: Uuid, token: String, lifetime: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + lifetime,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// One page of a newest-first listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.total + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }

    /// Whether `page` lies outside the listing. Page 1 of an empty listing is in range.
    pub fn out_of_range(page: u32, per_page: u32, total: u64) -> bool {
        if page < 1 {
            return true;
        }
        let last = ((total + per_page as u64 - 1) / per_page as u64).max(1);
        page as u64 > last
    }

    pub fn offset(page: u32, per_page: u32) -> i64 {
        (page.saturating_sub(1) as i64) * per_page as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: u32, total: u64) -> Page<()> {
        Page { items: vec![], page, per_page: 5, total }
    }

    #[test]
    fn test_page_math() {
        assert_eq!(page(1, 0).pages(), 0);
        assert_eq!(page(1, 5).pages(), 1);
        assert_eq!(page(1, 6).pages(), 2);
        assert!(page(1, 6).has_next());
        assert!(!page(2, 6).has_next());
        assert!(page(2, 6).has_prev());
        assert_eq!(Page::<()>::offset(3, 5), 10);
    }

    #[test]
    fn test_out_of_range() {
        assert!(Page::<()>::out_of_range(0, 5, 10));
        assert!(!Page::<()>::out_of_range(1, 5, 0));
        assert!(Page::<()>::out_of_range(2, 5, 0));
        assert!(!Page::<()>::out_of_range(2, 5, 6));
        assert!(Page::<()>::out_of_range(3, 5, 10));
    }

    #[test]
    fn test_session_expiry() {
        let live = UserSession::new(Uuid::new_v4(), "t".into(), chrono::Duration::hours(1));
        assert!(!live.is_expired());
        let dead = UserSession::new(Uuid::new_v4(), "t".into(), chrono::Duration::seconds(-1));
        assert!(dead.is_expired());
    }
}

//! The users/settings environment shared by the lifecycle tests.

#![allow(clippy::duplicate_mod)]

use dbfixture::storage::TableStore;
use dbfixture::{MemoCache, SqlFixture, SqlStep};
use std::sync::Arc;

pub const SUPER_USER_LOGIN: &str = "superUserLogin";

/// Fixture with `users` and `settings` tables, one seeded setting and a
/// super-user step
pub fn users_and_settings(store: Arc<dyn TableStore>) -> SqlFixture {
    SqlFixture::new(store)
        .with_schema(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                superuser INTEGER NOT NULL DEFAULT 0
            )",
        )
        .with_schema("CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
        .with_seed("INSERT INTO settings (key, value) VALUES ('lang', 'en')")
        .with_super_user(Arc::new(SqlStep::new(
            "super-user",
            [format!("INSERT INTO users (login, superuser) VALUES ('{}', 1)", SUPER_USER_LOGIN)],
        )))
        .with_translations(Arc::new(SqlStep::new(
            "translations",
            [
                "CREATE TABLE translations (locale TEXT NOT NULL, key TEXT NOT NULL, label TEXT NOT NULL)",
                "INSERT INTO translations VALUES ('en', 'greeting', 'Hello')",
                "INSERT INTO translations VALUES ('fr', 'greeting', 'Bonjour')",
            ],
        )))
}

/// Fixture with three tables so a restore can fail part-way
pub fn three_tables(store: Arc<dyn TableStore>) -> SqlFixture {
    SqlFixture::new(store)
        .with_schema("CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .with_schema("CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
        .with_schema("CREATE TABLE users (id INTEGER PRIMARY KEY, login TEXT NOT NULL)")
        .with_seed("INSERT INTO accounts (id, name) VALUES (1, 'main')")
        .with_seed("INSERT INTO settings (key, value) VALUES ('theme', 'dark')")
        .with_seed("INSERT INTO users (id, login) VALUES (1, 'admin')")
}

/// Cache of setting values, as application code would keep one
pub fn settings_cache() -> Arc<MemoCache<String, String>> {
    Arc::new(MemoCache::new("settings"))
}

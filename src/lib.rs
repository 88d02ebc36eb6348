//! Inkpost - a blog CMS that runs the same models on two runtimes
//!
//! The `server` runtime talks to MySQL and hashes passwords with Argon2id.
//! The `edge` runtime uses an embedded SQLite handle and PBKDF2. Everything
//! above [`db::Database`] and [`services::PasswordHasher`] is shared.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

/// Database models for Tasklane
///
/// This module contains the database models and their CRUD operations.
///
/// # Models
///
/// - `user`: User accounts
/// - `task`: Tasks owned by users, with filtering, sorting, and bulk operations
///
/// Every task operation takes the owner's id and applies it inside the SQL
/// statement itself; ownership is never checked after the fact.

pub mod task;
pub mod user;

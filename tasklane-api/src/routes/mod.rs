/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Liveness, readiness, and combined health endpoints
/// - `auth`: Authentication endpoints (register, login, me)
/// - `tasks`: Task CRUD, filtering, and bulk operations
/// - `web`: Server-rendered UI pages and fragments

pub mod auth;
pub mod health;
pub mod tasks;
pub mod web;

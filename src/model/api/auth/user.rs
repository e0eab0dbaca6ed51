use serde::{Deserialize, Serialize};

use crate::model::db::Voter;

/// The rights levels an authentication token can represent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rights {
    Voter,
    Admin,
}

/// A type of authenticated user.
pub trait User {
    const RIGHTS: Rights;
}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

/// Marker type for administrators. Admins are not database entities; they
/// are wallet addresses on the configured allow-list.
pub struct AdminUser;

impl User for AdminUser {
    const RIGHTS: Rights = Rights::Admin;
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    TheaterManager,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" | "user" => Ok(Role::Customer),
            "theater_manager" | "manager" => Ok(Role::TheaterManager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Whether the actor owns the hold or booking being acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owner,
    NotOwner,
}

impl Ownership {
    pub fn of(actor_user_id: &str, resource_user_id: &str) -> Self {
        if actor_user_id == resource_user_id {
            Ownership::Owner
        } else {
            Ownership::NotOwner
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    HoldSeats,
    ExtendHold,
    /// Release the holds of the named holder. Staff may name any user.
    ReleaseHold,
    /// Release holds without naming a holder.
    ForceReleaseHold,
    CreateBooking,
    ViewBooking,
    CancelBooking,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self { user_id: user_id.into(), role }
    }

    pub fn can(&self, action: Action, resource_owner: &str) -> bool {
        can_perform(self.role, Ownership::of(&self.user_id, resource_owner), action)
    }
}

/// Single capability check for every seat and booking operation.
pub fn can_perform(role: Role, ownership: Ownership, action: Action) -> bool {
    match (role, action) {
        (Role::Admin, _) => true,
        (_, Action::ForceReleaseHold) => false,
        (Role::TheaterManager, Action::ViewBooking | Action::CancelBooking | Action::ReleaseHold) => true,
        _ => ownership == Ownership::Owner,
    }
}

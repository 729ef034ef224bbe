//! `user.v1` wire messages and the generated service glue.

use crate::store::User;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetUserRequest {
    #[prost(string, tag = "1")]
    pub username: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserReply {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub email: ::prost::alloc::string::String,
    #[prost(uint64, tag = "4")]
    pub discord_id: u64,
    #[prost(int64, tag = "5")]
    pub total_credits: i64,
    /// Unix seconds.
    #[prost(int64, tag = "6")]
    pub created_at: i64,
}

/// Zero `limit` means the server default.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListUsersRequest {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
    #[prost(uint64, tag = "2")]
    pub limit: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListUsersReply {
    #[prost(uint64, tag = "1")]
    pub total_count: u64,
    #[prost(message, repeated, tag = "2")]
    pub items: ::prost::alloc::vec::Vec<UserReply>,
}

impl From<User> for UserReply {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email.unwrap_or_default(),
            discord_id: user.discord_id,
            total_credits: user.total_credits,
            created_at: user.created_at.timestamp(),
        }
    }
}

include!(concat!(env!("OUT_DIR"), "/user.v1.UserService.rs"));

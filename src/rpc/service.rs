//! `user.v1.UserService` backed by the shared user store.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use super::proto::user_service_server::UserService;
use super::proto::{GetUserRequest, ListUsersReply, ListUsersRequest, UserReply};
use crate::store::{ListOptions, StoreError, UserStore};

pub struct UserRpc {
    store: Arc<dyn UserStore>,
}

impl UserRpc {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

fn status(err: StoreError) -> Status {
    match err {
        StoreError::NotFound(_) => Status::not_found(err.to_string()),
        StoreError::AlreadyExists(_) => Status::already_exists(err.to_string()),
        StoreError::Unavailable(reason) => {
            tracing::error!(%reason, "Store unavailable");
            Status::unavailable("user store unavailable")
        }
    }
}

#[tonic::async_trait]
impl UserService for UserRpc {
    #[instrument(skip(self, request), fields(method = "GetUser"))]
    async fn get_user(&self, request: Request<GetUserRequest>) -> Result<Response<UserReply>, Status> {
        let req = request.into_inner();
        if req.username.is_empty() {
            return Err(Status::invalid_argument("username is required"));
        }
        let user = self.store.get_by_username(&req.username).await.map_err(status)?;
        Ok(Response::new(user.into()))
    }

    #[instrument(skip(self, request), fields(method = "ListUsers"))]
    async fn list_users(
        &self,
        request: Request<ListUsersRequest>,
    ) -> Result<Response<ListUsersReply>, Status> {
        let req = request.into_inner();
        let options = ListOptions {
            offset: Some(req.offset),
            limit: (req.limit > 0).then_some(req.limit),
        };
        let list = self.store.list(options).await.map_err(status)?;
        Ok(Response::new(ListUsersReply {
            total_count: list.total_count,
            items: list.items.into_iter().map(UserReply::from).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::test_hash;
    use crate::store::{MemoryUserStore, User};
    use chrono::Utc;

    async fn service() -> (UserRpc, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        for name in ["alice", "bob", "carol"] {
            store
                .create(User {
                    id: 0,
                    name: name.into(),
                    email: None,
                    password: test_hash("pw"),
                    discord_id: 0,
                    total_credits: 5,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        (UserRpc::new(store.clone()), store)
    }

    #[tokio::test]
    async fn get_user_maps_store_results() {
        let (rpc, store) = service().await;

        let reply = rpc
            .get_user(Request::new(GetUserRequest { username: "bob".into() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.name, "bob");
        assert_eq!(reply.total_credits, 5);

        let missing = rpc
            .get_user(Request::new(GetUserRequest { username: "dave".into() }))
            .await
            .unwrap_err();
        assert_eq!(missing.code(), tonic::Code::NotFound);

        store.close().await.unwrap();
        let closed = rpc
            .get_user(Request::new(GetUserRequest { username: "bob".into() }))
            .await
            .unwrap_err();
        assert_eq!(closed.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn list_users_pages() {
        let (rpc, _) = service().await;
        let reply = rpc
            .list_users(Request::new(ListUsersRequest { offset: 1, limit: 1 }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.total_count, 3);
        assert_eq!(reply.items.len(), 1);

        let all = rpc
            .list_users(Request::new(ListUsersRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(all.items.len(), 3);
    }
}

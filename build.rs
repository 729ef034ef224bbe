//! Generates the tonic server and client glue for `user.v1.UserService`.
//!
//! Messages are declared in Rust (`src/rpc/proto.rs`) with prost derives, so
//! no `protoc` is needed at build time.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let method = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::rpc::proto::{input}"))
            .output_type(format!("crate::rpc::proto::{output}"))
            .codec_path("tonic_prost::ProstCodec")
            .build()
    };

    let service = tonic_build::manual::Service::builder()
        .name("UserService")
        .package("user.v1")
        .method(method("get_user", "GetUser", "GetUserRequest", "UserReply"))
        .method(method(
            "list_users",
            "ListUsers",
            "ListUsersRequest",
            "ListUsersReply",
        ))
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}

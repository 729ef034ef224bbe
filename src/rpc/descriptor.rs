//! Protobuf descriptor of `user.v1`, registered with the reflection service.
//!
//! Must stay in step with the message definitions in `proto.rs` and the
//! service declared in `build.rs`.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};

pub const PACKAGE: &str = "user.v1";
pub const SERVICE_NAME: &str = "user.v1.UserService";

fn field(name: &str, json_name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        json_name: Some(json_name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn method(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(format!(".{PACKAGE}.{input}")),
        output_type: Some(format!(".{PACKAGE}.{output}")),
        ..Default::default()
    }
}

pub fn file_descriptor_set() -> FileDescriptorSet {
    let items = FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        type_name: Some(format!(".{PACKAGE}.UserReply")),
        ..field("items", "items", 2, Type::Message)
    };

    let file = FileDescriptorProto {
        name: Some("user/v1/user.proto".to_string()),
        package: Some(PACKAGE.to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message("GetUserRequest", vec![field("username", "username", 1, Type::String)]),
            message(
                "UserReply",
                vec![
                    field("id", "id", 1, Type::Uint64),
                    field("name", "name", 2, Type::String),
                    field("email", "email", 3, Type::String),
                    field("discord_id", "discordId", 4, Type::Uint64),
                    field("total_credits", "totalCredits", 5, Type::Int64),
                    field("created_at", "createdAt", 6, Type::Int64),
                ],
            ),
            message(
                "ListUsersRequest",
                vec![
                    field("offset", "offset", 1, Type::Uint64),
                    field("limit", "limit", 2, Type::Uint64),
                ],
            ),
            message(
                "ListUsersReply",
                vec![field("total_count", "totalCount", 1, Type::Uint64), items],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("UserService".to_string()),
            method: vec![
                method("GetUser", "GetUserRequest", "UserReply"),
                method("ListUsers", "ListUsersRequest", "ListUsersReply"),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    FileDescriptorSet { file: vec![file] }
}

//! STRATUS gRPC API
//!
//! This crate defines the gRPC protocol for stratusd ↔ CLI communication.
//! The protobuf definitions are in `proto/stratus.proto` and code-generated via `tonic-build`.

// Include the generated code
pub mod stratus {
    pub mod v1 {
        tonic::include_proto!("stratus.v1");
    }
}

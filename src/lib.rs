pub mod alloc;
pub mod config;
pub mod error;
pub mod grpc;
pub mod interrupt;
pub mod resource;
pub mod session;
pub mod shutdown;
pub mod stream;
pub mod task;
pub mod tls;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("slurmx");
}

//! Stream layer: exposes connections as blocking byte streams.
//!
//! Each attached connection gets an [`endpoint::Endpoint`] with a bounded
//! inbound buffer and a line-buffered outbound side. The
//! [`StreamAdapter`] maps slots to endpoints and is addressed by path,
//! `<base>/<slot>`.

pub mod adapter;
pub mod byte_ring;
pub mod endpoint;
pub mod handle;
pub mod reassembly;

pub use adapter::{FallbackSink, StreamAdapter};
pub use byte_ring::ByteRing;
pub use endpoint::{Delivery, Endpoint};
pub use handle::EndpointStream;
pub use reassembly::FragmentAssembler;

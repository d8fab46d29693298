//! switchyard: a transparent Minecraft proxy (protocol 772, game 1.21.8).
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────────┐
//!                 │                          SWITCHYARD                          │
//!                 │                                                              │
//!   client TCP    │  ┌──────────┐   ┌───────────────────┐   ┌────────────────┐   │
//!  ───────────────┼─▶│   net    │──▶│ upstream Link     │──▶│ UpstreamHandler│   │
//!                 │  │ listener │   │ pipeline + codec  │   │ status / login │   │
//!                 │  └──────────┘   └───────────────────┘   └───────┬────────┘   │
//!                 │                          ▲                      │ forward    │
//!                 │                          │ forward              ▼            │
//!                 │                 ┌────────┴──────────┐   ┌────────────────┐   │   backend TCP
//!                 │                 │ DownstreamHandler │◀──│ downstream Link│◀──┼────────────────
//!                 │                 └───────────────────┘   └────────────────┘   │
//!                 │                                                ▲             │
//!                 │  ┌──────────┐   ┌──────────────┐   ┌───────────┴──────────┐  │
//!                 │  │   auth   │   │ directory /  │   │ connect: initial and │  │
//!                 │  │ RSA, AES │   │ server list  │   │ switch orchestration │  │
//!                 │  └──────────┘   └──────────────┘   └──────────────────────┘  │
//!                 │                                                              │
//!                 │  config · observability · lifecycle                          │
//!                 └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes go through `pipeline` (cipher, framing, compression) and `protocol`
//! (registry and codec) on every link. The four protocol states of a
//! connection decide which codec table applies in each direction.

// Wire
pub mod pipeline;
pub mod protocol;

// Core
pub mod auth;
pub mod connect;
pub mod net;
pub mod proxy;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{Connection, ProxyContext, ProxyServer};

//! Runtime metrics: connection lifecycle, bytes moved, events processed,
//! and pool pressure.

use metriken::{Counter, Gauge, metric};

// ── Connection lifecycle ─────────────────────────────────────────

#[metric(
    name = "litenet/connections/accepted",
    description = "Total inbound connections accepted"
)]
pub static CONNECTIONS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "litenet/connections/opened",
    description = "Total outbound connections and UDP sockets opened"
)]
pub static CONNECTIONS_OPENED: Counter = Counter::new();

#[metric(
    name = "litenet/connections/closed",
    description = "Total sockets closed"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(
    name = "litenet/connections/active",
    description = "Currently active sockets"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "litenet/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "litenet/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

// ── Worker loop ──────────────────────────────────────────────────

#[metric(
    name = "litenet/events/processed",
    description = "Total completion events dispatched by workers"
)]
pub static EVENTS_PROCESSED: Counter = Counter::new();

#[metric(
    name = "litenet/events/stale",
    description = "Completion events discarded for already-closed sockets"
)]
pub static EVENTS_STALE: Counter = Counter::new();

// ── Pools ────────────────────────────────────────────────────────

#[metric(
    name = "litenet/pool/io_allocated",
    description = "I/O contexts allocated because the pool was empty"
)]
pub static IO_POOL_ALLOCATED: Counter = Counter::new();

#[metric(
    name = "litenet/pool/io_discarded",
    description = "I/O contexts freed because the pool was full on release"
)]
pub static IO_POOL_DISCARDED: Counter = Counter::new();

/// Storage layer for a commit log segment.
///
/// Two leaf components, paired by an owning segment:
/// - Store: append-only file of length-prefixed frames
/// - Index: fixed-capacity mmapped array of (relative offset, position)
/// - Mmap: the writable mapping that backs the Index
///
/// Write path: `Store::append` returns a position, the owner records
/// `(relative_offset, position)` with `Index::write`.
/// Read path: `Index::read(n)` gives the position, `Store::read` the payload.
///
/// Neither component locks across the pair; ordering between them belongs
/// to the owner.
pub mod index;
pub mod mmap;
pub mod store;

pub use index::{Index, ENT_WIDTH, OFF_WIDTH, POS_WIDTH};
pub use store::{Store, LEN_WIDTH};

//! Named schema fragments that can be spliced into user schemas.

use std::borrow::Cow;

/// Placeholder replaced by [`BLOCK_SCHEMA`].
pub const BLOCK_ALIAS: &str = "block.tlb";

/// Common block types: `Maybe`, `Either`, `VarUInteger`, `Coins`,
/// `MsgAddress` and friends.
pub const BLOCK_SCHEMA: &str = include_str!("schemas/block.tlb");

/// Replace the first occurrence of each alias. Text without aliases is
/// returned borrowed.
pub fn expand_aliases(schema: &str) -> Cow<'_, str> {
    if schema.contains(BLOCK_ALIAS) {
        Cow::Owned(schema.replacen(BLOCK_ALIAS, BLOCK_SCHEMA, 1))
    } else {
        Cow::Borrowed(schema)
    }
}

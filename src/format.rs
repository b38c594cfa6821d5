//! Container format constants shared across the writer, reader, composer,
//! and unpacker.

/// File extension of a physical container (a Parquet file).
pub const CONTAINER_EXT: &str = "rpk";

/// File extension of a virtual composition document (JSON).
pub const VIRTUAL_EXT: &str = "vrpk";

/// File extension of a checksum ledger.
pub const LEDGER_EXT: &str = "sha256";

/// Root attribute holding the build timestamp.
pub const ATTR_CREATION_DATE: &str = "creation_date";

/// Root attribute identifying the producing tool and version.
pub const ATTR_PRODUCER: &str = "producer";

/// Root attribute listing composition sources (virtual containers only).
pub const ATTR_SOURCE: &str = "source";

/// Root attribute flagging a virtual composition.
pub const ATTR_IS_VIRTUAL: &str = "is_virtual";

/// Attribute names managed by the tool; user attrs may not shadow them and
/// they are not carried back into schemas on unpack.
pub const RESERVED_ATTRS: [&str; 4] = [
    ATTR_CREATION_DATE,
    ATTR_PRODUCER,
    ATTR_SOURCE,
    ATTR_IS_VIRTUAL,
];

/// Timestamp format used for `creation_date`.
pub const CREATION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// True if `name` is one of the tool-managed attribute names.
pub fn is_reserved_attr(name: &str) -> bool {
    RESERVED_ATTRS.contains(&name)
}

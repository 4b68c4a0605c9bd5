//! Table and index descriptors (§3, §4.1).
//!
//! A [`TableDescriptor`] is the unit of metastore persistence: every state
//! transition in [`crate::create`] and [`crate::drop`] loads one, mutates it,
//! and writes it back before the change becomes visible to other nodes.
use std::fmt;

use errors::ErrorMetadata;

/// Maximum accepted prefix length for an index column, in bytes.
pub const MAX_KEY_LENGTH: u16 = 767;

pub type ColumnOffset = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Char,
    VarChar,
    Text,
    Blob,
}

impl ColumnType {
    fn is_character(self) -> bool {
        matches!(self, Self::Char | Self::VarChar | Self::Text)
    }

    fn is_blob(self) -> bool {
        matches!(self, Self::Blob)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    /// Set iff this column is the sole column of some `Public` unique index (I4).
    pub unique_key: bool,
    /// Set when this column leads some index but isn't covered by `unique_key`.
    pub multiple_key: bool,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub offset: ColumnOffset,
    pub ty: ColumnType,
    pub flags: ColumnFlags,
}

/// Index states, per §3. DML obligations for each variant are documented on
/// the variant itself; `onCreateIndex`/`onDropIndex` only ever move a
/// descriptor to an adjacent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Descriptor exists but DML must ignore it entirely.
    None,
    /// DML deletes matching entries on delete/update; never inserts.
    DeleteOnly,
    /// DML maintains entries on every mutation and enforces uniqueness;
    /// readers ignore the index.
    WriteOnly,
    /// Same DML obligations as `WriteOnly`; a backfill from a pre-transition
    /// snapshot is in progress.
    WriteReorganization,
    /// Same DML obligations as `DeleteOnly`; a bulk delete of index keys is
    /// in progress.
    DeleteReorganization,
    /// Fully usable for reads and writes.
    Public,
}

/// Case-insensitive index name (I1: at most one descriptor per name unless a
/// prior one is being dropped).
#[derive(Debug, Clone)]
pub struct IndexName(String);

impl IndexName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for IndexName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}
impl Eq for IndexName {}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct IndexColumn {
    pub name: String,
    pub offset: ColumnOffset,
    /// Prefix length; `None` means "unspecified" (§3).
    pub length: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    /// Assigned once from `TableDescriptor::max_index_id` and never reused (I2, I3).
    pub id: i64,
    pub name: IndexName,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub state: IndexState,
}

impl IndexDescriptor {
    pub fn is_single_column(&self) -> bool {
        self.columns.len() == 1
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableDescriptor {
    pub table_id: i64,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexDescriptor>,
    pub max_index_id: i64,
}

impl TableDescriptor {
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index_by_name(&self, name: &IndexName) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|idx| &idx.name == name)
    }

    pub fn index_by_name_mut(&mut self, name: &IndexName) -> Option<&mut IndexDescriptor> {
        self.indexes.iter_mut().find(|idx| &idx.name == name)
    }

    /// Assigns the next index id and bumps the monotonic counter (I2).
    pub fn next_index_id(&mut self) -> i64 {
        self.max_index_id += 1;
        self.max_index_id
    }
}

/// One `(columnRef, length)` pair as supplied by the DDL front-end.
#[derive(Debug, Clone)]
pub struct IndexColumnSpec {
    pub column_name: String,
    pub length: Option<u16>,
}

/// Builds an `IndexDescriptor` pinned in state `None` (§4.1).
///
/// Validation runs in order and fails fast with the first matching error; see
/// open question (a) in DESIGN.md regarding duplicate column names, which
/// this builder rejects rather than silently accepting.
pub fn build_index_descriptor(
    table: &mut TableDescriptor,
    unique: bool,
    name: IndexName,
    columns: Vec<IndexColumnSpec>,
) -> anyhow::Result<IndexDescriptor> {
    let mut seen = std::collections::HashSet::new();
    let mut index_columns = Vec::with_capacity(columns.len());
    for spec in columns {
        let column = table.column_by_name(&spec.column_name).ok_or_else(|| {
            ErrorMetadata::not_found(
                "KeyColumnDoesNotExist",
                format!("column {} does not exist", spec.column_name),
            )
        })?;
        if !seen.insert(column.offset) {
            anyhow::bail!(ErrorMetadata::bad_request(
                "DuplicateColumnInIndex",
                format!("column {} appears twice in index {name}", column.name),
            ));
        }
        match spec.length {
            None if column.ty.is_blob() || column.ty == ColumnType::Text => {
                anyhow::bail!(ErrorMetadata::bad_request(
                    "BlobKeyWithoutLength",
                    format!("column {} is a blob/text column and needs a key length", column.name),
                ));
            },
            Some(_) if !column.ty.is_character() && !column.ty.is_blob() => {
                anyhow::bail!(ErrorMetadata::bad_request(
                    "IncorrectPrefixKey",
                    format!("column {} cannot take a prefix length", column.name),
                ));
            },
            Some(length) if length > MAX_KEY_LENGTH => {
                anyhow::bail!(ErrorMetadata::bad_request(
                    "TooLongKey",
                    format!("key length {length} exceeds the maximum of {MAX_KEY_LENGTH}"),
                ));
            },
            _ => {},
        }
        index_columns.push(IndexColumn {
            name: column.name.clone(),
            offset: column.offset,
            length: spec.length,
        });
    }

    let id = table.next_index_id();
    Ok(IndexDescriptor {
        id,
        name,
        columns: index_columns,
        unique,
        state: IndexState::None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_columns(columns: &[(&str, ColumnType)]) -> TableDescriptor {
        TableDescriptor {
            table_id: 1,
            columns: columns
                .iter()
                .enumerate()
                .map(|(offset, (name, ty))| Column {
                    name: name.to_string(),
                    offset,
                    ty: *ty,
                    flags: ColumnFlags::default(),
                })
                .collect(),
            indexes: vec![],
            max_index_id: 0,
        }
    }

    #[test]
    fn rejects_missing_column() {
        let mut table = table_with_columns(&[("id", ColumnType::Integer)]);
        let err = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx"),
            vec![IndexColumnSpec {
                column_name: "nope".to_string(),
                length: None,
            }],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("does not exist"));
    }

    #[test]
    fn rejects_blob_without_length() {
        let mut table = table_with_columns(&[("payload", ColumnType::Blob)]);
        let err = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx"),
            vec![IndexColumnSpec {
                column_name: "payload".to_string(),
                length: None,
            }],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("blob/text"));
    }

    #[test]
    fn rejects_length_on_non_character_column() {
        let mut table = table_with_columns(&[("id", ColumnType::Integer)]);
        let err = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx"),
            vec![IndexColumnSpec {
                column_name: "id".to_string(),
                length: Some(8),
            }],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("prefix length"));
    }

    #[test]
    fn accepts_length_exactly_at_boundary() {
        let mut table = table_with_columns(&[("name", ColumnType::VarChar)]);
        let descriptor = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx"),
            vec![IndexColumnSpec {
                column_name: "name".to_string(),
                length: Some(MAX_KEY_LENGTH),
            }],
        )
        .unwrap();
        assert_eq!(descriptor.columns[0].length, Some(MAX_KEY_LENGTH));
    }

    #[test]
    fn rejects_length_over_boundary() {
        let mut table = table_with_columns(&[("name", ColumnType::VarChar)]);
        let err = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx"),
            vec![IndexColumnSpec {
                column_name: "name".to_string(),
                length: Some(MAX_KEY_LENGTH + 1),
            }],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("TooLongKey"));
    }

    #[test]
    fn rejects_duplicate_column_in_index() {
        let mut table = table_with_columns(&[("a", ColumnType::Integer), ("b", ColumnType::Integer)]);
        let err = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx"),
            vec![
                IndexColumnSpec { column_name: "a".to_string(), length: None },
                IndexColumnSpec { column_name: "a".to_string(), length: None },
            ],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("twice"));
    }

    #[test]
    fn assigns_monotonically_increasing_ids() {
        let mut table = table_with_columns(&[("a", ColumnType::Integer)]);
        let first = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx1"),
            vec![IndexColumnSpec { column_name: "a".to_string(), length: None }],
        )
        .unwrap();
        let second = build_index_descriptor(
            &mut table,
            false,
            IndexName::new("idx2"),
            vec![IndexColumnSpec { column_name: "a".to_string(), length: None }],
        )
        .unwrap();
        assert!(second.id > first.id);
        assert_eq!(table.max_index_id, second.id);
    }
}

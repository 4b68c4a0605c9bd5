//! Column-flag maintainer (§4.2).
use crate::descriptor::{
    IndexDescriptor,
    TableDescriptor,
};

/// Sets `unique_key` when `index` is unique and single-column; otherwise
/// sets `multiple_key` on the index's leading column.
pub fn add_index_column_flag(table: &mut TableDescriptor, index: &IndexDescriptor) {
    let offset = index.columns[0].offset;
    let Some(column) = table.columns.get_mut(offset) else {
        return;
    };
    if index.unique && index.is_single_column() {
        column.flags.unique_key = true;
    } else {
        column.flags.multiple_key = true;
    }
}

/// Clears the flag `index` contributed, then re-derives it from every
/// remaining index that leads with the same column, preserving I4 without a
/// full-table rescan.
pub fn drop_index_column_flag(table: &mut TableDescriptor, index: &IndexDescriptor) {
    let offset = index.columns[0].offset;
    if let Some(column) = table.columns.get_mut(offset) {
        column.flags.unique_key = false;
        column.flags.multiple_key = false;
    }

    let others: Vec<IndexDescriptor> = table
        .indexes
        .iter()
        .filter(|other| other.id != index.id && other.columns.first().map(|c| c.offset) == Some(offset))
        .cloned()
        .collect();
    for other in &others {
        add_index_column_flag(table, other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        Column,
        ColumnFlags,
        ColumnType,
        IndexColumn,
        IndexName,
        IndexState,
    };

    fn table() -> TableDescriptor {
        TableDescriptor {
            table_id: 1,
            columns: vec![Column {
                name: "a".to_string(),
                offset: 0,
                ty: ColumnType::Integer,
                flags: ColumnFlags::default(),
            }],
            indexes: vec![],
            max_index_id: 0,
        }
    }

    fn index(id: i64, name: &str, unique: bool) -> IndexDescriptor {
        IndexDescriptor {
            id,
            name: IndexName::new(name),
            columns: vec![IndexColumn {
                name: "a".to_string(),
                offset: 0,
                length: None,
            }],
            unique,
            state: IndexState::Public,
        }
    }

    #[test]
    fn unique_single_column_sets_unique_key() {
        let mut table = table();
        let idx = index(1, "idx", true);
        add_index_column_flag(&mut table, &idx);
        assert!(table.columns[0].flags.unique_key);
        assert!(!table.columns[0].flags.multiple_key);
    }

    #[test]
    fn non_unique_sets_multiple_key() {
        let mut table = table();
        let idx = index(1, "idx", false);
        add_index_column_flag(&mut table, &idx);
        assert!(!table.columns[0].flags.unique_key);
        assert!(table.columns[0].flags.multiple_key);
    }

    #[test]
    fn drop_reapplies_flag_from_remaining_index() {
        let mut table = table();
        let unique_idx = index(1, "unique_idx", true);
        let multi_idx = index(2, "multi_idx", false);
        table.indexes.push(unique_idx.clone());
        table.indexes.push(multi_idx.clone());
        add_index_column_flag(&mut table, &unique_idx);

        drop_index_column_flag(&mut table, &unique_idx);

        // P6-relevant: dropping the unique index should fall back to the
        // flag contributed by the remaining non-unique index.
        assert!(!table.columns[0].flags.unique_key);
        assert!(table.columns[0].flags.multiple_key);
    }

    #[test]
    fn drop_last_index_clears_all_flags() {
        let mut table = table();
        let idx = index(1, "idx", true);
        table.indexes.push(idx.clone());
        add_index_column_flag(&mut table, &idx);

        drop_index_column_flag(&mut table, &idx);

        assert!(!table.columns[0].flags.unique_key);
        assert!(!table.columns[0].flags.multiple_key);
    }
}

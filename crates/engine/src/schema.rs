//! Group schema: table and column descriptors.
//!
//! The schema is metadata only; it never holds row data. It is serialized
//! with bincode into a blob hanging off the group root, so every committed
//! version carries the exact schema it was written under.
//!
//! Backlink bookkeeping is derived, not stored: for a target table, the
//! incoming link columns across the whole group (ordered by origin table
//! key, then origin column key) define that table's backlink columns. The
//! `TableData` backlink slots are aligned with this derived order.

use mica_core::{ColKey, ColumnAttrs, ColumnType, Error, LinkType, Result, TableKey};
use serde::{Deserialize, Serialize};

/// Link column target and ownership semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Table the link points into
    pub target: TableKey,
    /// Cascade (Strong) or nullify (Weak) semantics
    pub link_type: LinkType,
}

/// One column descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Stable column key, unique within the table
    pub key: ColKey,
    /// Column name, unique within the table
    pub name: String,
    /// Data type
    pub ty: ColumnType,
    /// Whether null is a legal value
    pub nullable: bool,
    /// Index / uniqueness attributes
    pub attrs: ColumnAttrs,
    /// Present iff `ty == Link`
    pub link: Option<LinkSpec>,
}

impl ColumnSchema {
    /// Whether this column carries a separate null mask.
    ///
    /// Links encode null as the 0 sentinel and lists have no null rows,
    /// so neither needs a mask.
    pub fn has_null_mask(&self) -> bool {
        self.nullable && self.ty != ColumnType::Link && self.ty != ColumnType::IntList
    }
}

/// One table descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Stable table key, unique within the group
    pub key: TableKey,
    /// Table name, unique within the group
    pub name: String,
    /// Columns in creation order
    pub columns: Vec<ColumnSchema>,
    /// Next column key to assign
    pub next_col_key: u32,
}

impl TableSchema {
    /// Position of a column by name
    pub fn col_pos(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::ColumnNotFound(format!("{}.{}", self.name, name)))
    }

    /// Column descriptor by name
    pub fn column(&self, name: &str) -> Result<&ColumnSchema> {
        Ok(&self.columns[self.col_pos(name)?])
    }
}

/// Identifies an incoming link column: position of the origin table and
/// of the link column within it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklinkSource {
    /// Position of the origin table in `Schema::tables`
    pub table_pos: usize,
    /// Position of the link column in the origin table
    pub col_pos: usize,
    /// Ownership semantics of the origin column
    pub link_type: LinkType,
}

/// The whole group's schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Tables in creation order
    pub tables: Vec<TableSchema>,
    /// Next table key to assign
    pub next_table_key: u32,
}

impl Schema {
    /// Position of a table by name
    pub fn table_pos(&self, name: &str) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Position of a table by key
    pub fn table_pos_by_key(&self, key: TableKey) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.key == key)
            .ok_or_else(|| Error::TableNotFound(format!("{key}")))
    }

    /// Table descriptor by name
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        Ok(&self.tables[self.table_pos(name)?])
    }

    /// Incoming link columns of the table at `target_pos`, in backlink
    /// slot order (origin table key, then origin column key).
    pub fn backlink_sources(&self, target_pos: usize) -> Vec<BacklinkSource> {
        let target = self.tables[target_pos].key;
        let mut out = Vec::new();
        for (ti, table) in self.tables.iter().enumerate() {
            for (ci, col) in table.columns.iter().enumerate() {
                if let Some(link) = col.link {
                    if link.target == target {
                        out.push((table.key, col.key, ti, ci, link.link_type));
                    }
                }
            }
        }
        out.sort_by_key(|(tk, ck, ..)| (tk.0, ck.0));
        out.into_iter()
            .map(|(_, _, table_pos, col_pos, link_type)| BacklinkSource {
                table_pos,
                col_pos,
                link_type,
            })
            .collect()
    }

    /// Backlink slot index on the target table for the link column at
    /// (`origin_pos`, `col_pos`)
    pub fn backlink_slot(&self, target_pos: usize, origin_pos: usize, col_pos: usize) -> Result<usize> {
        self.backlink_sources(target_pos)
            .iter()
            .position(|s| s.table_pos == origin_pos && s.col_pos == col_pos)
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "no backlink slot on table {} for origin {}.{}",
                    self.tables[target_pos].name,
                    self.tables[origin_pos].name,
                    self.tables[origin_pos].columns[col_pos].name
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_col(key: u32, name: &str, target: TableKey, link_type: LinkType) -> ColumnSchema {
        ColumnSchema {
            key: ColKey(key),
            name: name.to_string(),
            ty: ColumnType::Link,
            nullable: true,
            attrs: ColumnAttrs::NONE,
            link: Some(LinkSpec { target, link_type }),
        }
    }

    #[test]
    fn test_backlink_order_follows_keys() {
        let schema = Schema {
            tables: vec![
                TableSchema {
                    key: TableKey(0),
                    name: "target".into(),
                    columns: vec![],
                    next_col_key: 0,
                },
                TableSchema {
                    key: TableKey(1),
                    name: "a".into(),
                    columns: vec![
                        link_col(5, "second", TableKey(0), LinkType::Weak),
                        link_col(2, "first", TableKey(0), LinkType::Strong),
                    ],
                    next_col_key: 6,
                },
            ],
            next_table_key: 2,
        };
        let sources = schema.backlink_sources(0);
        assert_eq!(sources.len(), 2);
        // Column key 2 before column key 5, regardless of creation order
        assert_eq!(sources[0].col_pos, 1);
        assert_eq!(sources[0].link_type, LinkType::Strong);
        assert_eq!(sources[1].col_pos, 0);
        assert_eq!(schema.backlink_slot(0, 1, 1).unwrap(), 0);
        assert_eq!(schema.backlink_slot(0, 1, 0).unwrap(), 1);
    }

    #[test]
    fn test_lookup_errors() {
        let schema = Schema::default();
        assert!(matches!(
            schema.table_pos("nope"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_null_mask_rules() {
        let mut col = link_col(0, "l", TableKey(0), LinkType::Weak);
        assert!(!col.has_null_mask());
        col.ty = ColumnType::Int;
        col.link = None;
        assert!(col.has_null_mask());
        col.nullable = false;
        assert!(!col.has_null_mask());
    }
}

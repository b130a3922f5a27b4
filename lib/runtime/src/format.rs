use itertools::Itertools;
use memscope_config::CellWidth;

use crate::{memory::Address, snapshot::Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One table row ready to be drawn in a monospace font
pub struct Row {
    pub address: Address,
    pub cells: Vec<String>,
    pub ascii: Option<String>,
}

impl Row {
    pub fn label(&self) -> String {
        format!("{:08X}", self.address)
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}  {}", self.label(), self.cells.iter().join(" "))?;

        if let Some(ascii) = &self.ascii {
            write!(f, "  |{ascii}|")?;
        }

        Ok(())
    }
}

/// Header labels giving each column's offset within a row
pub fn column_headers(columns: u32, width: CellWidth) -> Vec<String> {
    (0..columns)
        .map(|column| format!("{:02X}", column * width.bytes()))
        .collect()
}

/// Split a snapshot into rows of `columns` little endian cells
///
/// A trailing cell cut short by the end of the snapshot shows only the bytes it has
pub fn format_rows(
    snapshot: &Snapshot,
    columns: u32,
    width: CellWidth,
    show_ascii: bool,
) -> Vec<Row> {
    let row_bytes = columns.max(1) as usize * width.bytes() as usize;

    snapshot
        .bytes()
        .chunks(row_bytes)
        .enumerate()
        .map(|(index, row)| Row {
            address: snapshot.address() + (index * row_bytes) as u32,
            cells: row
                .chunks(width.bytes() as usize)
                .map(|cell| {
                    cell.iter()
                        .rev()
                        .map(|byte| format!("{byte:02X}"))
                        .collect()
                })
                .collect(),
            ascii: show_ascii.then(|| {
                row.iter()
                    .map(|byte| {
                        if byte.is_ascii_graphic() || *byte == b' ' {
                            char::from(*byte)
                        } else {
                            '.'
                        }
                    })
                    .collect()
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use memscope_config::RegionConfig;

    use super::*;
    use crate::{
        memory::AddressSpace,
        snapshot::{CachePolicy, SnapshotCache},
    };

    fn snapshot(bytes: &[u8]) -> Snapshot {
        let address_space =
            AddressSpace::new([RegionConfig::new("Main RAM", 0x0200_0000, 0x40_0000, true)])
                .unwrap();
        address_space.write(0x0200_0010, bytes).unwrap();

        SnapshotCache::new(Arc::new(address_space), CachePolicy::default())
            .get_range(0x0200_0010, bytes.len() as u32)
            .unwrap()
    }

    #[test]
    fn headers() {
        assert_eq!(
            column_headers(4, CellWidth::Byte),
            ["00", "01", "02", "03"]
        );
        assert_eq!(
            column_headers(4, CellWidth::Word),
            ["00", "04", "08", "0C"]
        );
    }

    #[test]
    fn byte_rows() {
        let rows = format_rows(&snapshot(b"Hi!\x00\x7fABC"), 4, CellWidth::Byte, true);

        assert_eq!(
            rows,
            [
                Row {
                    address: 0x0200_0010,
                    cells: vec!["48".into(), "69".into(), "21".into(), "00".into()],
                    ascii: Some("Hi!.".into()),
                },
                Row {
                    address: 0x0200_0014,
                    cells: vec!["7F".into(), "41".into(), "42".into(), "43".into()],
                    ascii: Some(".ABC".into()),
                },
            ]
        );
        assert_eq!(rows[0].to_string(), "02000010  48 69 21 00  |Hi!.|");
    }

    #[test]
    fn zero_columns_is_one_column() {
        let rows = format_rows(&snapshot(&[1, 2]), 0, CellWidth::Byte, false);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].to_string(), "02000011  02");
    }

    #[test]
    fn wide_cells_are_little_endian() {
        let rows = format_rows(
            &snapshot(&[0x78, 0x56, 0x34, 0x12, 0xef, 0xbe]),
            2,
            CellWidth::Word,
            false,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells, ["12345678", "BEEF"]);
        assert_eq!(rows[0].ascii, None);
        assert_eq!(rows[0].to_string(), "02000010  12345678 BEEF");
    }
}

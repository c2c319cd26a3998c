//! Aggregates over shipment records

use std::collections::BTreeMap;

use serde::Serialize;

use crate::record::ShipmentRecord;

/// Orders sharing one SKU, size, color and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRow {
    pub orders: usize,
    pub qty: u32,
    pub size: String,
    pub color: String,
    pub sku: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRow {
    pub name: String,
    pub packages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTables {
    pub orders: Vec<OrderRow>,
    pub total_orders: usize,
    /// Sum of the QTY column, one term per row regardless of its order count
    pub total_qty: u64,
    pub couriers: Vec<CountRow>,
    pub companies: Vec<CountRow>,
}

impl SummaryTables {
    pub fn build(records: &[ShipmentRecord]) -> Self {
        let mut groups: BTreeMap<(&str, &str, &str, u32), usize> = BTreeMap::new();
        for r in records {
            *groups
                .entry((r.sku.as_str(), r.size.as_str(), r.color.as_str(), r.qty))
                .or_default() += 1;
        }

        let orders: Vec<OrderRow> = groups
            .into_iter()
            .map(|((sku, size, color, qty), orders)| OrderRow {
                orders,
                qty,
                size: size.to_string(),
                color: color.to_string(),
                sku: sku.to_string(),
            })
            .collect();
        let total_orders = orders.iter().map(|r| r.orders).sum();
        let total_qty = orders.iter().map(|r| u64::from(r.qty)).sum();

        Self {
            orders,
            total_orders,
            total_qty,
            couriers: count_by(records.iter().map(|r| r.courier.as_str())),
            companies: count_by(records.iter().map(|r| r.seller.as_str())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Counts per name, largest first, equal counts by name.
fn count_by<'r>(names: impl Iterator<Item = &'r str>) -> Vec<CountRow> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut rows: Vec<CountRow> = counts
        .into_iter()
        .map(|(name, packages)| CountRow {
            name: name.to_string(),
            packages,
        })
        .collect();
    // Stable sort keeps the name order among equal counts
    rows.sort_by(|a, b| b.packages.cmp(&a.packages));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn record(sku: &str, size: &str, qty: u32, courier: &str, seller: &str) -> ShipmentRecord {
        ShipmentRecord {
            sku: sku.to_string(),
            size: size.to_string(),
            qty,
            color: "Red".to_string(),
            order_no: String::new(),
            courier: courier.to_string(),
            seller: seller.to_string(),
        }
    }

    #[test]
    fn test_orders_grouped_and_sorted() {
        let records = vec![
            record("B", "M", 1, "Delhivery", "Acme"),
            record("A", "XL", 2, "Valmo", "Acme"),
            record("A", "XL", 2, "Delhivery", "Beta"),
            record("A", "L", 1, "Delhivery", "Acme"),
        ];
        let tables = SummaryTables::build(&records);

        let keys: Vec<(usize, &str, &str, u32)> = tables
            .orders
            .iter()
            .map(|r| (r.orders, r.sku.as_str(), r.size.as_str(), r.qty))
            .collect();
        assert_eq!(keys, vec![(1, "A", "L", 1), (2, "A", "XL", 2), (1, "B", "M", 1)]);
        assert_eq!(tables.total_orders, 4);
        assert_eq!(tables.total_qty, 4);
    }

    #[test]
    fn test_total_qty_counts_each_row_once() {
        let records = vec![
            record("A", "XL", 2, "Delhivery", "Acme"),
            record("A", "XL", 2, "Delhivery", "Acme"),
            record("A", "XL", 2, "Delhivery", "Acme"),
        ];
        let tables = SummaryTables::build(&records);
        assert_eq!(tables.orders.len(), 1);
        assert_eq!(tables.orders[0].orders, 3);
        assert_eq!(tables.total_orders, 3);
        assert_eq!(tables.total_qty, 2);
    }

    #[test]
    fn test_count_tables_sorted_by_count_then_name() {
        let records = vec![
            record("A", "M", 1, "Valmo", "Zed"),
            record("A", "M", 1, "Delhivery", "Acme"),
            record("A", "M", 1, "Delhivery", "Zed"),
            record("A", "M", 1, "Shadowfax", "Acme"),
        ];
        let tables = SummaryTables::build(&records);
        assert_eq!(
            tables.couriers,
            vec![
                CountRow { name: "Delhivery".to_string(), packages: 2 },
                CountRow { name: "Shadowfax".to_string(), packages: 1 },
                CountRow { name: "Valmo".to_string(), packages: 1 },
            ]
        );
        assert_eq!(tables.companies[0].name, "Acme");
        assert_eq!(tables.companies[1].name, "Zed");
    }

    #[test]
    fn test_empty_records_give_empty_tables() {
        assert!(SummaryTables::build(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_tables_account_for_every_record(
            rows in prop::collection::vec(
                (0usize..3, 0usize..3, 1u32..4, 0usize..3, 0usize..3),
                1..40,
            )
        ) {
            let records: Vec<ShipmentRecord> = rows
                .iter()
                .map(|&(sku, size, qty, courier, seller)| {
                    record(
                        ["A", "B", "C"][sku],
                        ["S", "M", "L"][size],
                        qty,
                        ["Delhivery", "Valmo", "Unknown"][courier],
                        ["Acme", "Beta", "Unknown"][seller],
                    )
                })
                .collect();
            let tables = SummaryTables::build(&records);

            prop_assert_eq!(tables.orders.iter().map(|r| r.orders).sum::<usize>(), records.len());
            prop_assert_eq!(tables.total_orders, records.len());
            prop_assert_eq!(tables.couriers.iter().map(|r| r.packages).sum::<usize>(), records.len());
            prop_assert_eq!(tables.companies.iter().map(|r| r.packages).sum::<usize>(), records.len());
        }
    }
}

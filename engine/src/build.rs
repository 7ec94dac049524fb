use crate::config::ColumnNames;
use crate::hierarchy::{DistrictMap, FacilityList, HierarchyIndex};
use crate::parse::parse_locations;
use crate::types::LocationRecord;

/// Build the location tree from dataset rows.
///
/// Fields are trimmed and rows without a district are dropped. Blank
/// chiefdom/section values still create (blank-keyed) nodes; blank
/// facilities add nothing. Facilities are deduplicated per section and
/// sorted once every row is in.
pub fn build_index<I>(rows: I) -> HierarchyIndex
where
    I: IntoIterator<Item = LocationRecord>,
{
    let mut tree: DistrictMap = DistrictMap::new();

    for row in rows {
        let district = row.district.trim();
        if district.is_empty() {
            continue;
        }
        let facility = row.facility.trim();

        let facilities = tree
            .entry(district.to_string())
            .or_default()
            .entry(row.chiefdom.trim().to_string())
            .or_default()
            .entry(row.section.trim().to_string())
            .or_default();

        if !facility.is_empty() && !facilities.iter().any(|f| f == facility) {
            facilities.push(facility.to_string());
        }
    }

    sort_facilities(&mut tree);
    HierarchyIndex { tree }
}

fn facility_lists(tree: &mut DistrictMap) -> Vec<&mut FacilityList> {
    tree.values_mut()
        .flat_map(|chiefdoms| chiefdoms.values_mut())
        .flat_map(|sections| sections.values_mut())
        .collect()
}

#[cfg(feature = "native")]
fn sort_facilities(tree: &mut DistrictMap) {
    use rayon::prelude::*;
    facility_lists(tree)
        .into_par_iter()
        .for_each(|facilities| facilities.sort());
}

#[cfg(not(feature = "native"))]
fn sort_facilities(tree: &mut DistrictMap) {
    for facilities in facility_lists(tree) {
        facilities.sort();
    }
}

/// Parse the CSV dataset and build the index. Never fails: an unusable
/// dataset is logged and produces an empty index, which leaves every level
/// below district disabled.
pub fn load_index(dataset: &str, columns: &ColumnNames) -> HierarchyIndex {
    match parse_locations(dataset, columns) {
        Ok(rows) => {
            let index = build_index(rows);
            crate::console_log!("Loaded {} districts from CSV", index.district_count());
            index
        }
        Err(e) => {
            crate::console_warn!(
                "Location data could not be loaded ({}). Cascading dropdowns may not work.",
                e
            );
            HierarchyIndex::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_and_sort_facilities() {
        let index = build_index(vec![
            LocationRecord::new("IL", "Kailahun", "Sec1", "FacA"),
            LocationRecord::new("IL", "Kailahun", "Sec1", "FacA"),
            LocationRecord::new("IL", "Kailahun", "Sec1", "FacB"),
        ]);
        assert_eq!(index.facilities("IL", "Kailahun", "Sec1"), vec!["FacA", "FacB"]);
    }

    #[test]
    fn test_out_of_order_rows_sorted() {
        let index = build_index(vec![
            LocationRecord::new("Bo", "Badjia", "Ngelehun", "Zimmi"),
            LocationRecord::new("Bo", "Badjia", "Ngelehun", "Alpha"),
            LocationRecord::new("Bo", "Badjia", "Ngelehun", "Moyamba"),
        ]);
        assert_eq!(
            index.facilities("Bo", "Badjia", "Ngelehun"),
            vec!["Alpha", "Moyamba", "Zimmi"]
        );
    }

    #[test]
    fn test_fields_trimmed_and_blank_district_dropped() {
        let index = build_index(vec![
            LocationRecord::new("  Bo ", " Badjia", "Ngelehun  ", " Ngelehun CHC "),
            LocationRecord::new("   ", "Orphan", "Orphan", "Orphan"),
        ]);
        assert_eq!(index.districts(), vec!["Bo"]);
        assert_eq!(index.facilities("Bo", "Badjia", "Ngelehun"), vec!["Ngelehun CHC"]);
    }

    #[test]
    fn test_blank_levels_kept_as_nodes() {
        let index = build_index(vec![LocationRecord::new("Kono", "", "", "")]);
        assert_eq!(index.chiefdoms("Kono"), vec![""]);
        assert_eq!(index.sections("Kono", ""), vec![""]);
        assert!(index.facilities("Kono", "", "").is_empty());
    }

    #[test]
    fn test_every_level_has_children() {
        let index = build_index(vec![
            LocationRecord::new("Bo", "Badjia", "", "X"),
            LocationRecord::new("Kono", "", "", ""),
        ]);
        for d in index.districts() {
            let chiefdoms = index.chiefdoms(&d);
            assert!(!chiefdoms.is_empty());
            for c in chiefdoms {
                assert!(!index.sections(&d, &c).is_empty());
            }
        }
    }

    #[test]
    fn test_load_index_bad_dataset_is_empty() {
        let index = load_index("not,a,location,file\n1,2,3,4\n", &ColumnNames::default());
        assert!(index.is_empty());
        assert!(index.districts().is_empty());
    }

    #[test]
    fn test_load_index_from_csv() {
        let csv = "adm1,adm2,adm3,hf\nBo,Badjia,Ngelehun,Ngelehun CHC\nBo,Badjia,Ngelehun,Kpetema MCHP\n";
        let index = load_index(csv, &ColumnNames::default());
        assert_eq!(
            index.facilities("Bo", "Badjia", "Ngelehun"),
            vec!["Kpetema MCHP", "Ngelehun CHC"]
        );
    }
}

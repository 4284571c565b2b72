use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use shared::{
    codes::{BillStatus, Gender},
    domain::{PatientId, PatientSummary},
};

use super::*;
use crate::{
    records::{
        InvoiceRow, InvoiceSearchField, InvoiceSortField, PatientSearchField, PatientSortField,
    },
    test_support::{bill, order_line, patient, service},
};

type Directory = ViewState<PatientSummary>;
type Change = fn(&mut Directory);

fn directory() -> Vec<PatientSummary> {
    let mut patients: Vec<PatientSummary> = (1..=15)
        .map(|i| patient(i, &format!("Lan {i:02}")))
        .collect();
    patients.extend((16..=25).map(|i| patient(i, &format!("Minh {i:02}"))));
    patients
}

fn names(slice: &ViewSlice<PatientSummary>) -> Vec<String> {
    slice
        .visible
        .iter()
        .map(|patient| patient.full_name.clone())
        .collect()
}

#[test]
fn search_then_paginate_matches_directory_example() {
    let mut state = ViewState::new(directory());
    state.set_search_term("an");

    let first = state.view();
    assert_eq!(first.total_filtered, 15);
    assert_eq!(first.total_pages, 2);
    assert!(first.show_pager());
    assert_eq!(
        names(&first),
        (1..=10).map(|i| format!("Lan {i:02}")).collect::<Vec<_>>()
    );

    assert_eq!(state.set_page(2), 2);
    let second = state.view();
    assert_eq!(
        names(&second),
        (11..=15).map(|i| format!("Lan {i:02}")).collect::<Vec<_>>()
    );
    assert_eq!(second.first_index(), 11);
}

#[test]
fn search_is_case_insensitive_and_trimmed() {
    let mut state = ViewState::new(directory());
    state.set_search_term("  MINH ");
    assert_eq!(state.view().total_filtered, 10);
}

#[test]
fn empty_result_has_zero_pages_and_no_pager() {
    let mut state = ViewState::new(directory());
    state.set_search_term("không có ai");
    let slice = state.view();
    assert!(slice.visible.is_empty());
    assert_eq!(slice.total_filtered, 0);
    assert_eq!(slice.total_pages, 0);
    assert_eq!(slice.page, 1);
    assert_eq!(slice.first_index(), 0);
    assert!(!slice.show_pager());

    let empty: ViewState<PatientSummary> = ViewState::default();
    assert_eq!(empty.view().total_pages, 0);
}

#[test]
fn single_page_hides_pager() {
    let state = ViewState::new(directory()[..4].to_vec());
    let slice = state.view();
    assert_eq!(slice.total_pages, 1);
    assert!(!slice.show_pager());
}

#[test]
fn every_input_change_resets_page() {
    let mut state = ViewState::new(directory());
    let changes: [Change; 8] = [
        |s: &mut Directory| s.set_search_term("lan"),
        |s: &mut Directory| s.set_search_scope(SearchScope::Field(PatientSearchField::Name)),
        |s: &mut Directory| s.set_category(Some(Gender::Other)),
        |s: &mut Directory| s.set_sort_field(PatientSortField::Id),
        |s: &mut Directory| s.set_sort_order(SortOrder::Desc),
        |s: &mut Directory| s.toggle_sort(PatientSortField::Name),
        |s: &mut Directory| s.set_page_size(5),
        |s: &mut Directory| s.replace_items(directory()),
    ];
    for change in changes {
        state.set_search_term("");
        state.set_page_size(10);
        assert_eq!(state.set_page(2), 2);
        change(&mut state);
        assert_eq!(state.page(), 1);
    }
}

#[test]
fn set_page_clamps_to_existing_pages() {
    let mut state = ViewState::new(directory());
    assert_eq!(state.set_page(99), 3);
    assert_eq!(state.set_page(0), 1);
    assert_eq!(state.next_page(), 2);
    assert_eq!(state.previous_page(), 1);
    assert_eq!(state.previous_page(), 1);
}

#[test]
fn derive_view_clamps_stale_page() {
    let items = directory();
    let query = ViewQuery::<PatientSummary> {
        page: 7,
        ..ViewQuery::default()
    };
    let slice = derive_view(&items, &query);
    assert_eq!(slice.page, 3);
    assert_eq!(slice.visible.len(), 5);
}

#[test]
fn scoped_search_only_checks_that_field() {
    let mut state = ViewState::new(directory());
    state.set_search_term("0900000001");
    assert_eq!(state.view().total_filtered, 1);
    state.set_search_scope(SearchScope::Field(PatientSearchField::Name));
    assert_eq!(state.view().total_filtered, 0);
}

#[test]
fn category_filter_is_exact() {
    let mut patients = directory();
    patients[0].gender = Gender::Female;
    patients[3].gender = Gender::Female;
    let mut state = ViewState::new(patients);
    state.set_category(Some(Gender::Female));
    let slice = state.view();
    assert_eq!(slice.total_filtered, 2);
    state.set_category(None);
    assert_eq!(state.view().total_filtered, 25);
}

#[test]
fn toggle_sort_flips_active_field() {
    let mut state = ViewState::new(directory());
    state.toggle_sort(PatientSortField::Name);
    assert_eq!(state.query().sort_order, SortOrder::Desc);
    assert_eq!(names(&state.view())[0], "Minh 25");
    state.toggle_sort(PatientSortField::Id);
    assert_eq!(state.query().sort_order, SortOrder::Asc);
    assert_eq!(state.view().visible[0].patient_id, PatientId(1));
}

#[test]
fn text_sort_ignores_case_and_is_stable() {
    let items = vec![
        patient(1, "bình"),
        patient(2, "An"),
        patient(3, "an"),
        patient(4, "Bình"),
    ];
    let sorted = filter_and_sort(&items, &ViewQuery::default());
    let order: Vec<i64> = sorted.iter().map(|p| p.patient_id.0).collect();
    assert_eq!(order, vec![2, 3, 4, 1]);
}

#[test]
fn vietnamese_names_sort_by_base_letter() {
    let items = vec![
        patient(1, "Đặng Văn Hùng"),
        patient(2, "Ánh Nguyễn"),
        patient(3, "Bình Trần"),
        patient(4, "Zoe Lê"),
        patient(5, "Dũng Phạm"),
        patient(6, "Ông Ích Khiêm"),
    ];
    let sorted = filter_and_sort(&items, &ViewQuery::default());
    let names: Vec<&str> = sorted.iter().map(|p| p.full_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Ánh Nguyễn",
            "Bình Trần",
            "Dũng Phạm",
            "Đặng Văn Hùng",
            "Ông Ích Khiêm",
            "Zoe Lê",
        ]
    );
}

#[test]
fn accents_only_break_ties() {
    let plain = SortKey::Text("Le".into());
    let accented = SortKey::Text("Lê".into());
    let later = SortKey::Text("Lf".into());
    assert_eq!(plain.compare(&accented), Ordering::Less);
    assert_eq!(accented.compare(&later), Ordering::Less);
}

#[test]
fn undated_invoices_sort_first() {
    let mut dated = bill(1, BillStatus::Unpaid, None);
    dated.created_at = Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
    let mut later = bill(2, BillStatus::Paid, None);
    later.created_at = Some(Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap());
    let undated = bill(3, BillStatus::Unpaid, None);

    let rows: Vec<InvoiceRow> = [later, undated, dated]
        .into_iter()
        .map(|bill| InvoiceRow {
            bill,
            services: Vec::new(),
        })
        .collect();
    let mut state = ViewState::new(rows);
    let order: Vec<i64> = state.view().visible.iter().map(|r| r.bill.bill_id.0).collect();
    assert_eq!(order, vec![3, 1, 2]);

    state.set_sort_order(SortOrder::Desc);
    let order: Vec<i64> = state.view().visible.iter().map(|r| r.bill.bill_id.0).collect();
    assert_eq!(order, vec![2, 1, 3]);

    state.set_sort_field(InvoiceSortField::Status);
    state.set_category(Some(BillStatus::Unpaid));
    assert_eq!(state.view().total_filtered, 2);
}

#[test]
fn invoices_are_searchable_by_service_name() {
    let row = InvoiceRow {
        bill: bill(4, BillStatus::BookingPaid, Some(9)),
        services: vec![order_line(1, 9, 2).with_service(service(2, "Xét nghiệm máu", 80_000.0))],
    };
    let other = InvoiceRow {
        bill: bill(5, BillStatus::Unpaid, None),
        services: Vec::new(),
    };
    let mut state = ViewState::new(vec![row, other]);
    state.set_search_term("xét nghiệm");
    assert_eq!(state.view().visible[0].bill.bill_id.0, 4);
    state.set_search_scope(SearchScope::Field(InvoiceSearchField::BillId));
    state.set_search_term("5");
    assert_eq!(state.view().visible.len(), 1);
    assert_eq!(state.view().visible[0].services_total(), 0.0);
}

#[test]
fn remove_and_upsert_by_key() {
    let mut state = ViewState::new(directory());
    assert!(state.remove(&PatientId(3)));
    assert!(!state.remove(&PatientId(3)));
    assert_eq!(state.items().len(), 24);

    state.upsert(patient(4, "Lan đổi tên"));
    assert_eq!(
        state.find(&PatientId(4)).map(|p| p.full_name.as_str()),
        Some("Lan đổi tên")
    );
    state.upsert(patient(99, "Mới"));
    assert_eq!(state.items().len(), 25);
}

fn arb_patients() -> impl Strategy<Value = Vec<PatientSummary>> {
    prop::collection::vec(("[a-d]{1,4}", 0u8..3), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (name, gender))| {
                let mut record = patient(i as i64, &name);
                record.gender = match gender {
                    0 => Gender::Male,
                    1 => Gender::Female,
                    _ => Gender::Other,
                };
                record
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn derive_view_is_pure(
        items in arb_patients(),
        term in "[a-d]{0,2}",
        page in 1usize..6,
        page_size in 1usize..8,
        descending in any::<bool>(),
    ) {
        let query = ViewQuery::<PatientSummary> {
            search_term: term,
            sort_order: if descending { SortOrder::Desc } else { SortOrder::Asc },
            page,
            page_size,
            ..ViewQuery::default()
        };
        prop_assert_eq!(derive_view(&items, &query), derive_view(&items, &query));
    }

    #[test]
    fn pages_partition_the_filtered_collection(
        items in arb_patients(),
        term in "[a-d]{0,1}",
        page_size in 1usize..8,
    ) {
        let mut query = ViewQuery::<PatientSummary> {
            search_term: term,
            page_size,
            ..ViewQuery::default()
        };
        let expected = filter_and_sort(&items, &query);
        let pages = total_pages(expected.len(), page_size);

        let mut collected = Vec::new();
        for page in 1..=pages {
            query.page = page;
            let slice = derive_view(&items, &query);
            prop_assert!(slice.visible.len() <= page_size);
            prop_assert_eq!(slice.total_pages, pages);
            collected.extend(slice.visible);
        }
        prop_assert_eq!(collected, expected);
    }
}

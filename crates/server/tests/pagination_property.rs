use std::sync::Arc;

use proptest::prelude::*;
use provenance_server::cursor::decode_page_token;
use provenance_server::filter::CelFilterCompiler;
use provenance_server::pagination::PaginationEngine;
use provenance_server::query::ListRequest;
use provenance_server::search::{MemorySearchIndex, Sort};
use serde_json::json;

const INDEX: &str = "occurrences";

fn request(page_size: Option<u32>, page_token: Option<String>) -> ListRequest {
    ListRequest::new(INDEX)
        .page(page_size, page_token)
        .sort(Sort::asc("resource.uri"))
        .collapse("resource.uri")
}

struct Walk {
    pages: Vec<Vec<String>>,
    offsets: Vec<u64>,
    unpaginated: Vec<String>,
    searches: u64,
}

async fn walk(uris: Vec<String>, page_size: u32) -> Walk {
    let index = Arc::new(MemorySearchIndex::new());
    for (id, uri) in uris.iter().enumerate() {
        index.insert(INDEX, id.to_string(), json!({ "resource": { "uri": uri } })).await;
    }
    let engine = PaginationEngine::new(index.clone(), Arc::new(CelFilterCompiler), "5m");

    let uris_of = |hits: Vec<provenance_server::search::Hit>| -> Vec<String> {
        hits.into_iter()
            .map(|hit| hit.source["resource"]["uri"].as_str().unwrap_or_default().to_string())
            .collect()
    };

    let unpaginated = uris_of(engine.list(&request(None, None)).await.expect("unpaginated list").hits);
    let before = index.searches();

    let mut pages = Vec::new();
    let mut offsets = vec![0];
    let mut token = None;
    loop {
        let page = engine.list(&request(Some(page_size), token)).await.expect("page");
        pages.push(uris_of(page.hits));
        if page.next_page_token.is_empty() {
            break;
        }
        offsets.push(decode_page_token(&page.next_page_token).expect("token decodes").offset);
        token = Some(page.next_page_token);
        assert!(pages.len() <= 1000, "pagination did not terminate");
    }

    Walk { pages, offsets, unpaginated, searches: index.searches() - before }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pages_concatenate_to_the_unpaginated_result(
        uris in prop::collection::vec("[a-z]{1,3}", 0..40),
        page_size in 1u32..10,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let walk = runtime.block_on(walk(uris.clone(), page_size));

        let distinct = uris.iter().collect::<std::collections::BTreeSet<_>>().len() as u64;
        let expected_pages = distinct.div_ceil(u64::from(page_size)).max(1);

        prop_assert_eq!(walk.pages.len() as u64, expected_pages);
        prop_assert_eq!(walk.searches, expected_pages);
        prop_assert_eq!(walk.pages.concat(), walk.unpaginated);
        if distinct > 0 {
            prop_assert!(walk.offsets.iter().all(|offset| *offset < distinct));
        }
    }
}

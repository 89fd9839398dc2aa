//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small legislation catalog and run
//! the full harvest cycle end-to-end against a temporary SQLite database.

use legis_harvest::config::{parse_config, Config};
use legis_harvest::crawler::{run_harvest, Termination};
use legis_harvest::storage::{RunStatus, SqliteStore, Store};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &Path, max_pages: u32) -> Config {
    parse_config(&format!(
        r#"
        [catalog]
        root-url = "{base}/busca?pagina=1"
        detail-base-url = "{base}"

        [crawler]
        max-pages = {max_pages}
        concurrency = 3
        batch-threshold = 50
        page-delay-ms = 0
        task-delay-ms = 0

        [fetch]
        max-retries = 2
        retry-base-delay-ms = 1
        timeout-secs = 5

        [output]
        database-path = "{db}"
        "#,
        base = base_url,
        max_pages = max_pages,
        db = db_path.display()
    ))
    .expect("Failed to parse test config")
}

fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("harvest.db");
    (dir, path)
}

/// Builds a listing page with the given item ids and next-page href
fn listing_page(ids: &[u32], next: Option<&str>) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<li class="busca-resultados__item">
                    <h3 class="busca-resultados__cabecalho"><a href="/legin/lei-{id}.html">Lei {id} (resumo)</a></h3>
                    <p class="busca-resultados__descricao">Dispõe sobre o tema {id}.</p>
                    <p class="busca-resultados__situacao">Situação: Em vigor</p>
                </li>"#,
                id = id
            )
        })
        .collect();

    let next_link = match next {
        Some(href) => format!(
            r#"<a class="pagination-list__nav-link" href="{}">Próxima</a>"#,
            href
        ),
        None => r##"<a class="pagination-list__nav-link" href="#">Próxima</a>"##.to_string(),
    };

    format!(
        r#"<html><body><ul class="busca-resultados">{}</ul>
        <nav><a class="pagination-list__nav-link" href="?pagina=1">Anterior</a>{}</nav>
        </body></html>"#,
        items, next_link
    )
}

fn detail_page(id: u32) -> String {
    format!(
        r#"<html><body><div class="dadosNorma">
            <h1>Lei nº {id}, de 9 de Janeiro de 2024</h1>
            <p class="ementa">EMENTA: Institui o programa {id}.</p>
            <a href="publicacaooriginal-{id}.html">Texto - Publicação Original</a>
            <div class="sessao">Origem: <span>Poder Executivo</span></div>
            <div class="sessao">Situação: <span>Sem Revogação Expressa</span></div>
            <div class="grupoRetratil"><div class="corpo">Educação</div></div>
        </div></body></html>"#,
        id = id
    )
}

fn original_text_page(id: u32) -> String {
    format!(
        r#"<html><body><div class="textoNorma">Art. 1º Fica instituído o programa {}.</div></body></html>"#,
        id
    )
}

async fn mount_listing(server: &MockServer, page: u32, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/busca"))
        .and(query_param("pagina", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, id: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/legin/lei-{}.html", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(id)))
        .mount(server)
        .await;
}

async fn mount_original_text(server: &MockServer, id: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/legin/publicacaooriginal-{}.html", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(original_text_page(id)))
        .mount(server)
        .await;
}

async fn mount_item(server: &MockServer, id: u32) {
    mount_detail(server, id).await;
    mount_original_text(server, id).await;
}

#[tokio::test]
async fn test_full_harvest_two_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1, 2, 3], Some("?pagina=2")), 1).await;
    mount_listing(&mock_server, 2, listing_page(&[4, 5, 6], None), 1).await;
    for id in 1..=6 {
        mount_item(&mock_server, id).await;
    }

    let config = create_test_config(&base_url, &db_path, 10);
    let summary = run_harvest(config, "test-hash")
        .await
        .expect("Harvest should start");

    assert_eq!(summary.termination, Termination::NoNextPage);
    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.items_processed, 6);
    assert_eq!(summary.items_failed, 0);
    assert_eq!(summary.records_inserted, 6);
    assert_eq!(summary.records_dropped, 0);

    let store = SqliteStore::new(&db_path).expect("Failed to open database");
    assert_eq!(store.count_records().unwrap(), 6);

    let identity = format!("{}/legin/lei-4.html", base_url);
    let stored = store
        .get_record(&identity)
        .unwrap()
        .expect("Record should exist");
    let record = stored.record;

    assert_eq!(
        record.title.as_deref(),
        Some("Lei nº 4, de 9 de Janeiro de 2024")
    );
    assert_eq!(record.summary_title, None);
    assert_eq!(
        record.summary_description.as_deref(),
        Some("Dispõe sobre o tema 4.")
    );
    assert_eq!(record.abstract_text.as_deref(), Some("Institui o programa 4."));
    assert_eq!(record.origin.as_deref(), Some("Poder Executivo"));
    assert_eq!(record.status.as_deref(), Some("Sem Revogação Expressa"));
    assert_eq!(record.subject_tags, vec!["Educação".to_string()]);
    assert_eq!(
        record.original_text_url,
        Some(format!("{}/legin/publicacaooriginal-4.html", base_url))
    );
    assert_eq!(
        record.original_text.as_deref(),
        Some("Art. 1º Fica instituído o programa 4.")
    );
    assert!(!record.fetch_error);

    let run = store.latest_run().unwrap().expect("Run should be recorded");
    assert_eq!(run.id, summary.run_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.pages_visited, 2);
}

#[tokio::test]
async fn test_second_run_updates_instead_of_inserting() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1, 2], None), 2).await;
    mount_item(&mock_server, 1).await;
    mount_item(&mock_server, 2).await;

    let first = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("First harvest should start");
    let identity = format!("{}/legin/lei-1.html", base_url);
    let created_at = SqliteStore::new(&db_path)
        .unwrap()
        .get_record(&identity)
        .unwrap()
        .expect("Record should exist")
        .created_at;

    let second = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Second harvest should start");

    assert_eq!(first.records_inserted, 2);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(second.records_updated, 2);
    assert_ne!(first.run_id, second.run_id);

    let store = SqliteStore::new(&db_path).unwrap();
    assert_eq!(store.count_records().unwrap(), 2);
    let stored = store.get_record(&identity).unwrap().unwrap();
    assert_eq!(stored.created_at, created_at);
}

#[tokio::test]
async fn test_duplicate_item_resolved_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1, 2], Some("?pagina=2")), 1).await;
    mount_listing(&mock_server, 2, listing_page(&[2, 3], None), 1).await;
    mount_item(&mock_server, 1).await;
    mount_item(&mock_server, 3).await;

    // Item 2 appears on both pages
    Mock::given(method("GET"))
        .and(path("/legin/lei-2.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(2)))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_original_text(&mock_server, 2).await;

    let summary = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(summary.items_discovered, 4);
    assert_eq!(summary.duplicates_skipped, 1);
    assert_eq!(summary.items_processed, 3);
    assert_eq!(
        SqliteStore::new(&db_path).unwrap().count_records().unwrap(),
        3
    );
}

#[tokio::test]
async fn test_pagination_loop_stops_without_refetching() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1], Some("?pagina=2")), 1).await;
    mount_listing(&mock_server, 2, listing_page(&[2], Some("?pagina=3")), 1).await;
    mount_listing(&mock_server, 3, listing_page(&[3], Some("?pagina=1")), 1).await;
    for id in 1..=3 {
        mount_item(&mock_server, id).await;
    }

    let summary = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(
        summary.termination,
        Termination::LoopDetected {
            url: format!("{}/busca?pagina=1", base_url)
        }
    );
    assert!(!summary.is_aborted());
    assert_eq!(summary.pages_visited, 3);
    assert_eq!(summary.records_inserted, 3);
}

#[tokio::test]
async fn test_page_limit_stops_traversal() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1], Some("?pagina=2")), 1).await;
    mount_listing(&mock_server, 2, listing_page(&[2], Some("?pagina=3")), 0).await;
    mount_item(&mock_server, 1).await;

    let summary = run_harvest(create_test_config(&base_url, &db_path, 1), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(summary.termination, Termination::PageLimitReached);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.records_inserted, 1);
}

#[tokio::test]
async fn test_original_text_failure_keeps_record_complete() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1], None), 1).await;
    mount_detail(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/legin/publicacaooriginal-1.html"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let summary = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(summary.items_failed, 0);

    let store = SqliteStore::new(&db_path).unwrap();
    let record = store
        .get_record(&format!("{}/legin/lei-1.html", base_url))
        .unwrap()
        .expect("Record should exist")
        .record;
    assert!(!record.fetch_error);
    assert_eq!(record.original_text, None);
    assert_eq!(
        record.title.as_deref(),
        Some("Lei nº 1, de 9 de Janeiro de 2024")
    );
}

#[tokio::test]
async fn test_detail_failure_stores_minimal_record() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1, 2], None), 1).await;
    mount_item(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/legin/lei-2.html"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let summary = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(summary.items_processed, 2);
    assert_eq!(summary.items_failed, 1);
    assert_eq!(summary.records_inserted, 2);

    let store = SqliteStore::new(&db_path).unwrap();
    let record = store
        .get_record(&format!("{}/legin/lei-2.html", base_url))
        .unwrap()
        .expect("Minimal record should exist")
        .record;
    assert!(record.fetch_error);
    assert_eq!(record.summary_title.as_deref(), Some("Lei 2 (resumo)"));
    assert_eq!(record.title, None);
    assert!(record.last_attempted_at.is_some());
    assert_eq!(store.count_failed_records().unwrap(), 1);
}

#[tokio::test]
async fn test_page_fetch_failure_aborts_but_keeps_earlier_records() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(&mock_server, 1, listing_page(&[1, 2], Some("?pagina=2")), 1).await;
    mount_item(&mock_server, 1).await;
    mount_item(&mock_server, 2).await;
    Mock::given(method("GET"))
        .and(path("/busca"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let summary = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(
        summary.termination,
        Termination::PageFetchFailed {
            url: format!("{}/busca?pagina=2", base_url)
        }
    );
    assert!(summary.is_aborted());
    assert_eq!(summary.records_inserted, 2);

    let store = SqliteStore::new(&db_path).unwrap();
    assert_eq!(store.count_records().unwrap(), 2);
    let run = store.latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
}

#[tokio::test]
async fn test_empty_results_page_ends_run() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let (_dir, db_path) = temp_db();

    mount_listing(
        &mock_server,
        1,
        "<html><body><p>Nenhum resultado encontrado</p></body></html>".to_string(),
        1,
    )
    .await;

    let summary = run_harvest(create_test_config(&base_url, &db_path, 10), "hash")
        .await
        .expect("Harvest should start");

    assert_eq!(summary.termination, Termination::EndOfResults);
    assert_eq!(summary.flushes, 0);
    assert_eq!(
        SqliteStore::new(&db_path).unwrap().count_records().unwrap(),
        0
    );
}

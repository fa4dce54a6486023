//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the FIPE service and run the
//! full crawl cycle end-to-end against a temporary database, cache and
//! checkpoint file.

use fipe_crawler::api::{endpoints, ApiError, ResponseCache};
use fipe_crawler::config::{parse_config, Config, OnFailure};
use fipe_crawler::storage::{Repository, Table};
use fipe_crawler::{Checkpoint, CrawlError, CrawlOutcome, Crawler};
use serde_json::json;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::Notify;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Form parameters of a recorded request
type Form = HashMap<String, String>;

fn form_of(request: &Request) -> Form {
    url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect()
}

/// Deterministic upstream with 3 periods, 3 manufacturers per period,
/// 2 models per manufacturer and 2 model-years per model
///
/// Every listing is served out of order so the crawler has to sort.
#[derive(Clone)]
struct FakeFipe {
    price: &'static str,
}

impl FakeFipe {
    fn new() -> Self {
        Self {
            price: "R$ 1.000,50",
        }
    }

    fn with_price(price: &'static str) -> Self {
        Self { price }
    }
}

fn price_token(form: &Form) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        form["codigoTabelaReferencia"],
        form["codigoMarca"],
        form["codigoModelo"],
        form["anoModelo"],
        form["codigoTipoCombustivel"]
    )
}

impl Respond for FakeFipe {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let form = form_of(request);

        let body = match request.url.path().trim_start_matches('/') {
            endpoints::REFERENCE_PERIODS => json!([
                {"Codigo": 6, "Mes": "junho/2024 "},
                {"Codigo": 4, "Mes": "abril/2024 "},
                {"Codigo": 5, "Mes": "maio/2024 "},
            ]),
            endpoints::MANUFACTURERS => json!([
                {"Value": "13", "Label": "Marca 13"},
                {"Value": "11", "Label": "Marca 11"},
                {"Value": "12", "Label": "Marca 12"},
            ]),
            endpoints::MODELS => {
                let manufacturer: i64 = form["codigoMarca"].parse().unwrap();
                json!({
                    "Modelos": [
                        {"Value": manufacturer * 100 + 2, "Label": "Modelo B"},
                        {"Value": manufacturer * 100 + 1, "Label": "Modelo A"},
                    ],
                    "Anos": [{"Value": "2014-1", "Label": "2014 Gasolina"}],
                })
            }
            endpoints::MODEL_YEARS => json!([
                {"Value": "2014-1", "Label": "2014 Gasolina"},
                {"Value": "2013-1", "Label": "2013 Gasolina"},
            ]),
            endpoints::PRICE => json!({
                "Valor": self.price,
                "Marca": format!("Marca {}", form["codigoMarca"]),
                "Modelo": "Modelo",
                "AnoModelo": form["anoModelo"].parse::<i64>().unwrap(),
                "Combustivel": "Gasolina",
                "CodigoFipe": "001004-9",
                "MesReferencia": "junho de 2024 ",
                "Autenticacao": price_token(&form),
                "TipoVeiculo": 1,
                "SiglaCombustivel": "G",
                "DataConsulta": "segunda-feira, 3 de junho de 2024 10:00",
            }),
            _ => return ResponseTemplate::new(404),
        };

        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// Upstream that stalls on one price and reports when it got there
struct StallingFipe {
    inner: FakeFipe,
    token: &'static str,
    reached: Arc<Notify>,
}

impl Respond for StallingFipe {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let response = self.inner.respond(request);

        if request.url.path() == format!("/{}", endpoints::PRICE)
            && price_token(&form_of(request)) == self.token
        {
            self.reached.notify_one();
            return response.set_delay(Duration::from_secs(60));
        }

        response
    }
}

async fn start_upstream(responder: impl Respond + 'static) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

fn test_config(base_url: &str, dir: &Path) -> Config {
    let toml = format!(
        r#"
[api]
base-url = "{base_url}"
timeout-secs = 30
pacing-ms = 0

[retry]
max-retries = 0
base-delay-ms = 1
max-delay-ms = 5
rate-limit-cooldown-ms = 0
server-error-cooldown-ms = 0

[cache]
directory = "{dir}/cache"

[crawl]
vehicle-type = "car"
checkpoint-path = "{dir}/checkpoint.json"
progress-every = 10

[output]
database-path = "{dir}/fipe.db"
"#,
        base_url = base_url,
        dir = dir.display()
    );

    parse_config(&toml).unwrap()
}

/// Form bodies of every request to `endpoint`, in arrival order
async fn requests_to(server: &MockServer, endpoint: &str) -> Vec<Form> {
    let wanted = format!("/{}", endpoint);
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == wanted)
        .map(form_of)
        .collect()
}

const ALL_PRICES: u64 = 3 * 3 * 2 * 2;

#[tokio::test]
async fn test_full_crawl_populates_every_table() {
    let server = start_upstream(FakeFipe::new()).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.periods, 3);
    assert_eq!(stats.prices, ALL_PRICES);
    assert_eq!(stats.skipped_subtrees, 0);

    let repo = crawler.repository();
    assert_eq!(repo.count_rows(Table::ReferencePeriods).unwrap(), 3);
    assert_eq!(repo.count_rows(Table::Manufacturers).unwrap(), 3);
    assert_eq!(repo.count_rows(Table::CarModels).unwrap(), 6);
    assert_eq!(repo.count_rows(Table::ModelYears).unwrap(), 12);
    assert_eq!(repo.count_rows(Table::Prices).unwrap(), ALL_PRICES);

    let price = repo.get_price_by_token("5-12-1201-2013-1").unwrap().unwrap();
    assert_eq!(price.value.to_string(), "1000.50");
    assert_eq!(price.reference_month_label, "junho de 2024");
    assert_eq!(price.reference_period_id, "5");
    assert_eq!(price.model_year_id, "2013-1");
    assert_eq!(price.raw_payload["Autenticacao"], "5-12-1201-2013-1");
}

#[tokio::test]
async fn test_traversal_is_ascending_regardless_of_upstream_order() {
    let server = start_upstream(FakeFipe::new()).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    crawler.run().await.unwrap();

    let periods: Vec<String> = requests_to(&server, endpoints::MANUFACTURERS)
        .await
        .into_iter()
        .map(|f| f["codigoTabelaReferencia"].clone())
        .collect();
    assert_eq!(periods, vec!["4", "5", "6"]);

    let manufacturers: Vec<String> = requests_to(&server, endpoints::MODELS)
        .await
        .into_iter()
        .filter(|f| f["codigoTabelaReferencia"] == "4")
        .map(|f| f["codigoMarca"].clone())
        .collect();
    assert_eq!(manufacturers, vec!["11", "12", "13"]);

    let first_prices: Vec<String> = requests_to(&server, endpoints::PRICE)
        .await
        .iter()
        .take(4)
        .map(price_token)
        .collect();
    assert_eq!(
        first_prices,
        vec![
            "4-11-1101-2013-1",
            "4-11-1101-2014-1",
            "4-11-1102-2013-1",
            "4-11-1102-2014-1",
        ]
    );
}

#[tokio::test]
async fn test_resume_skips_completed_subtrees() {
    let server = start_upstream(FakeFipe::new()).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let checkpoint = Checkpoint {
        period: 5,
        manufacturer: 12,
        ..Default::default()
    };

    let mut crawler = Crawler::new(&config, checkpoint).unwrap();
    let stats = crawler.run().await.unwrap();

    let manufacturer_listings = requests_to(&server, endpoints::MANUFACTURERS).await;
    assert!(manufacturer_listings
        .iter()
        .all(|f| f["codigoTabelaReferencia"] != "4"));

    let resumed: Vec<String> = requests_to(&server, endpoints::MODELS)
        .await
        .into_iter()
        .filter(|f| f["codigoTabelaReferencia"] == "5")
        .map(|f| f["codigoMarca"].clone())
        .collect();
    assert_eq!(resumed, vec!["12", "13"]);

    // Period 5 from manufacturer 12 on, then all of period 6
    assert_eq!(stats.prices, 2 * 4 + 3 * 4);
    assert_eq!(
        crawler.repository().count_rows(Table::Prices).unwrap(),
        2 * 4 + 3 * 4
    );
}

#[tokio::test]
async fn test_new_manufacturer_resets_descendant_cursors() {
    let server = start_upstream(FakeFipe::new()).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let checkpoint = Checkpoint {
        period: 5,
        manufacturer: 12,
        model: 1202,
        year_model: 201_401,
    };

    let mut crawler = Crawler::new(&config, checkpoint).unwrap();
    crawler.run().await.unwrap();

    let tokens: Vec<String> = requests_to(&server, endpoints::PRICE)
        .await
        .iter()
        .map(price_token)
        .filter(|t| t.starts_with("5-"))
        .collect();

    // Only the resumed model-year of manufacturer 12, then every model of 13
    assert_eq!(
        tokens,
        vec![
            "5-12-1202-2014-1",
            "5-13-1301-2013-1",
            "5-13-1301-2014-1",
            "5-13-1302-2013-1",
            "5-13-1302-2014-1",
        ]
    );
}

#[tokio::test]
async fn test_reference_cache_expires_but_listings_do_not() {
    let server = start_upstream(FakeFipe::new()).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut first = Crawler::new(&config, Checkpoint::default()).unwrap();
    first.run().await.unwrap();
    drop(first);
    let after_first = server.received_requests().await.unwrap().len();

    // Fresh reference listing: the second run is served entirely from cache
    let mut second = Crawler::new(&config, Checkpoint::default()).unwrap();
    second.run().await.unwrap();
    drop(second);
    assert_eq!(server.received_requests().await.unwrap().len(), after_first);

    // Age the reference listing past its TTL
    let fingerprint = ResponseCache::fingerprint(endpoints::REFERENCE_PERIODS, &[]);
    let entry = Path::new(&config.cache.directory).join(format!("{}.json", fingerprint));
    File::options()
        .write(true)
        .open(&entry)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(60 * 60 * 24 * 60))
        .unwrap();

    let mut third = Crawler::new(&config, Checkpoint::default()).unwrap();
    third.run().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), after_first + 1);
    assert_eq!(
        requests.last().unwrap().url.path(),
        format!("/{}", endpoints::REFERENCE_PERIODS)
    );
    assert_eq!(
        third.repository().count_rows(Table::Prices).unwrap(),
        ALL_PRICES
    );
}

#[tokio::test]
async fn test_exhausted_retries_fail_without_caching() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{}", endpoints::PRICE)))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(FakeFipe::new())
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.retry.max_retries = 2;

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let result = crawler.run().await;

    match result {
        Err(CrawlError::Api(ApiError::UpstreamRequest { attempts, .. })) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let params: Vec<(&str, String)> = vec![
        ("codigoTabelaReferencia", "4".to_string()),
        ("codigoMarca", "11".to_string()),
        ("codigoModelo", "1101".to_string()),
        ("codigoTipoVeiculo", "1".to_string()),
        ("anoModelo", "2013".to_string()),
        ("codigoTipoCombustivel", "1".to_string()),
        ("tipoConsulta", "tradicional".to_string()),
    ];
    let fingerprint = ResponseCache::fingerprint(endpoints::PRICE, &params);
    let cache = ResponseCache::new(&config.cache.directory).unwrap();
    assert!(!cache.contains(&fingerprint));
    assert_eq!(crawler.repository().count_rows(Table::Prices).unwrap(), 0);
}

#[tokio::test]
async fn test_listing_failure_skips_subtree() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{}", endpoints::MODEL_YEARS)))
        .and(body_string_contains("codigoModelo=1101"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(FakeFipe::new())
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.skipped_subtrees, 3);
    assert_eq!(stats.prices, ALL_PRICES - 3 * 2);
    assert!(crawler
        .repository()
        .get_price_by_token("4-11-1101-2013-1")
        .unwrap()
        .is_none());
}

/// Upstream whose model listing of manufacturer 12 is an error envelope
async fn models_rejecting_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{}", endpoints::MODELS)))
        .and(body_string_contains("codigoMarca=12"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"codigo": "0", "erro": "nadaencontrado"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(FakeFipe::new())
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_model_listing_failure_skips_manufacturer() {
    let server = models_rejecting_upstream().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let stats = crawler.run().await.unwrap();

    // Manufacturer 12 loses its 2 models x 2 model-years in every period
    assert_eq!(stats.skipped_subtrees, 3);
    assert_eq!(stats.prices, ALL_PRICES - 3 * 4);

    let repo = crawler.repository();
    assert_eq!(repo.count_rows(Table::Manufacturers).unwrap(), 3);
    assert_eq!(repo.count_rows(Table::CarModels).unwrap(), 4);
    assert!(repo
        .get_price_by_token("4-12-1201-2013-1")
        .unwrap()
        .is_none());
    assert!(repo
        .get_price_by_token("4-13-1301-2013-1")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_model_listing_failure_aborts_when_configured() {
    let server = models_rejecting_upstream().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawl.failure_policy.listing = OnFailure::Abort;

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let result = crawler.run().await;

    assert!(matches!(
        result,
        Err(CrawlError::Api(ApiError::UpstreamSemantic { .. }))
    ));
    // Only manufacturer 11 of the first period got through
    assert_eq!(crawler.repository().count_rows(Table::Prices).unwrap(), 4);
    assert_eq!(
        crawler.checkpoint(),
        Checkpoint {
            period: 4,
            manufacturer: 12,
            model: 0,
            year_model: 0,
        }
    );
}

async fn rejecting_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{}", endpoints::PRICE)))
        .and(body_string_contains("codigoModelo=1102"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"codigo": "0", "erro": "nadaencontrado"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(FakeFipe::new())
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_price_failure_aborts_by_default() {
    let server = rejecting_upstream().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let result = crawler.run().await;

    assert!(matches!(
        result,
        Err(CrawlError::Api(ApiError::UpstreamSemantic { .. }))
    ));
    assert_eq!(crawler.repository().count_rows(Table::Prices).unwrap(), 2);
    assert_eq!(
        crawler.checkpoint(),
        Checkpoint {
            period: 4,
            manufacturer: 11,
            model: 1102,
            year_model: 201_301,
        }
    );
}

#[tokio::test]
async fn test_price_failure_can_be_skipped() {
    let server = rejecting_upstream().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawl.failure_policy.price = OnFailure::Skip;

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.skipped_subtrees, 3 * 2);
    assert_eq!(stats.prices, ALL_PRICES - 3 * 2);
}

#[tokio::test]
async fn test_interruption_returns_resumable_checkpoint() {
    let reached = Arc::new(Notify::new());
    let stalling = StallingFipe {
        inner: FakeFipe::new(),
        token: "5-12-1201-2013-1",
        reached: reached.clone(),
    };
    let server = start_upstream(stalling).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let mut crawler = Crawler::new(&config, Checkpoint::default()).unwrap();
    let outcome = crawler
        .run_until(async move { reached.notified().await })
        .await
        .unwrap();

    let expected = Checkpoint {
        period: 5,
        manufacturer: 12,
        model: 1201,
        year_model: 201_301,
    };
    assert_eq!(outcome, CrawlOutcome::Interrupted(expected));
    // All of period 4 and manufacturer 11 of period 5
    assert_eq!(crawler.repository().count_rows(Table::Prices).unwrap(), 16);
    drop(crawler);

    // Resume against a healthy upstream with the same cache and database
    let healthy = start_upstream(FakeFipe::new()).await;
    let mut config = config;
    config.api.base_url = healthy.uri();

    let mut resumed = Crawler::new(&config, expected).unwrap();
    let outcome = resumed.run_until(std::future::pending()).await.unwrap();

    assert!(matches!(outcome, CrawlOutcome::Completed(_)));
    let prices = requests_to(&healthy, endpoints::PRICE).await;
    assert_eq!(price_token(&prices[0]), "5-12-1201-2013-1");
    assert_eq!(prices.len() as u64, ALL_PRICES - 16);
    assert_eq!(
        resumed.repository().count_rows(Table::Prices).unwrap(),
        ALL_PRICES
    );
}

#[tokio::test]
async fn test_requeried_price_updates_in_place() {
    let dir = TempDir::new().unwrap();

    let server = start_upstream(FakeFipe::new()).await;
    let config = test_config(&server.uri(), dir.path());
    let mut first = Crawler::new(&config, Checkpoint::default()).unwrap();
    first.run().await.unwrap();
    drop(first);

    // New quote upstream, cold cache
    let repriced = start_upstream(FakeFipe::with_price("R$ 1.100,00")).await;
    let mut config = config;
    config.api.base_url = repriced.uri();
    config.cache.directory = dir.path().join("cache-2").display().to_string();

    let mut second = Crawler::new(&config, Checkpoint::default()).unwrap();
    second.run().await.unwrap();

    let repo = second.repository();
    assert_eq!(repo.count_rows(Table::Prices).unwrap(), ALL_PRICES);
    assert_eq!(repo.count_rows(Table::Manufacturers).unwrap(), 3);
    let price = repo.get_price_by_token("4-11-1101-2013-1").unwrap().unwrap();
    assert_eq!(price.value.to_string(), "1100.00");
    assert_eq!(price.raw_payload["Valor"], "R$ 1.100,00");
}

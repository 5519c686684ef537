//! Integration tests for the two-step source selection wizard.

use odin_feed::feed::{Fetcher, RetryPolicy};
use odin_feed::pipeline::FeedSettings;
use odin_feed::wizard::{
    CountField, DetailInput, FormError, GroupInput, StepOutcome, Wizard, WizardMode, WizardStep,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> Fetcher {
    Fetcher::new(RetryPolicy::with_time_unit(Duration::from_millis(5))).unwrap()
}

fn alarm_item(n: usize, identifier: &str, station: &str) -> String {
    format!(
        "<item><title>{station} - Alarm {n}</title>\
         <link>https://www.odin.dk/112puls/?beredskabsID={identifier}&amp;enhed={station}</link>\
         <description>Alarm {n}</description></item>"
    )
}

fn rss(items: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <rss version=\"2.0\"><channel><title>ODIN</title>\
         <link>https://www.odin.dk</link><description>Alarmer</description>\
         {}</channel></rss>",
        items.concat()
    )
}

fn mixed_feed() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(rss(&[
        alarm_item(1, "4001", "BrandNord"),
        alarm_item(2, "5002", "Vest"),
        alarm_item(3, "4001", "BrandSyd"),
        alarm_item(4, "4001", "BrandNord"),
    ]))
}

async fn feed_server(response: ResponseTemplate) -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(response)
        .mount(&server)
        .await;
    let url = format!("{}/rss", server.uri());
    (server, url)
}

fn expect_form(outcome: &StepOutcome) -> &odin_feed::wizard::Form {
    outcome
        .form()
        .unwrap_or_else(|| panic!("expected a form, got {outcome:?}"))
}

// ============================================================================
// Setup
// ============================================================================

#[tokio::test]
async fn test_full_setup_flow() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let mut wizard = Wizard::setup(fetcher(), url.as_str());

    let outcome = wizard.select_group(None).await;
    let form = expect_form(&outcome);
    assert_eq!(form.step, WizardStep::SelectGroup);
    assert_eq!(form.choices, vec!["4001", "5002"]);
    assert_eq!(form.default_choice.as_deref(), Some("4001"));
    assert_eq!(form.error, None);
    assert_eq!(form.count, None);

    let outcome = wizard
        .select_group(Some(GroupInput {
            identifier: "4001".into(),
        }))
        .await;
    let form = expect_form(&outcome);
    assert_eq!(form.step, WizardStep::SelectDetail);
    assert_eq!(form.choices, vec!["BrandNord", "BrandSyd"]);
    assert_eq!(
        form.count,
        Some(CountField {
            min: 1,
            max: 20,
            default: 5
        })
    );
    assert_eq!(wizard.step(), WizardStep::SelectDetail);
    assert_eq!(wizard.selected_identifier(), Some("4001"));

    let outcome = wizard
        .select_detail(Some(DetailInput {
            station: "BrandSyd".into(),
            count: 8,
        }))
        .await;
    let StepOutcome::Complete(settings) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(
        settings,
        FeedSettings {
            feed_url: url,
            identifier: "4001".into(),
            station: "BrandSyd".into(),
            count: 8,
            local_filter: false,
        }
    );
}

#[tokio::test]
async fn test_empty_station_means_all_stations() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let mut wizard = Wizard::setup(fetcher(), url);

    wizard
        .select_group(Some(GroupInput {
            identifier: "5002".into(),
        }))
        .await;
    let outcome = wizard
        .select_detail(Some(DetailInput {
            station: String::new(),
            count: 20,
        }))
        .await;

    let StepOutcome::Complete(settings) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(settings.station, "");
    assert_eq!(settings.count, 20);
    assert_eq!(settings.unique_id(), "112odin_5002");
}

#[tokio::test]
async fn test_outcome_serializes_with_tag() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let mut wizard = Wizard::setup(fetcher(), url);

    let json = serde_json::to_value(wizard.select_group(None).await).unwrap();
    assert_eq!(json["outcome"], "form");
    assert_eq!(json["step"], "select_group");
    assert_eq!(json["choices"][1], "5002");
}

// ============================================================================
// Validation errors
// ============================================================================

#[tokio::test]
async fn test_unknown_identifier_stays_on_group_step() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let mut wizard = Wizard::setup(fetcher(), url);

    let outcome = wizard
        .select_group(Some(GroupInput {
            identifier: "9999".into(),
        }))
        .await;
    let form = expect_form(&outcome);
    assert_eq!(form.step, WizardStep::SelectGroup);
    assert_eq!(form.error, Some(FormError::UnknownIdentifier));
    assert_eq!(wizard.step(), WizardStep::SelectGroup);
    assert_eq!(wizard.selected_identifier(), None);

    let outcome = wizard
        .select_group(Some(GroupInput {
            identifier: "  ".into(),
        }))
        .await;
    assert_eq!(
        expect_form(&outcome).error,
        Some(FormError::IdentifierRequired)
    );
}

#[tokio::test]
async fn test_count_out_of_range_is_rejected() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let mut wizard = Wizard::setup(fetcher(), url);
    wizard
        .select_group(Some(GroupInput {
            identifier: "4001".into(),
        }))
        .await;

    for count in [0, 21, -1] {
        let outcome = wizard
            .select_detail(Some(DetailInput {
                station: "BrandNord".into(),
                count,
            }))
            .await;
        let form = expect_form(&outcome);
        assert_eq!(form.step, WizardStep::SelectDetail);
        assert_eq!(form.error, Some(FormError::CountOutOfRange), "count {count}");
    }
}

#[tokio::test]
async fn test_unknown_station_is_rejected() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let mut wizard = Wizard::setup(fetcher(), url);
    wizard
        .select_group(Some(GroupInput {
            identifier: "4001".into(),
        }))
        .await;

    // Vest belongs to another group
    let outcome = wizard
        .select_detail(Some(DetailInput {
            station: "Vest".into(),
            count: 5,
        }))
        .await;
    assert_eq!(expect_form(&outcome).error, Some(FormError::UnknownStation));
}

#[tokio::test]
async fn test_free_text_identifier_when_feed_has_no_markers() {
    let body = rss(&["<item><title>Brand - Skur</title><description>x</description></item>".to_string()]);
    let (server, url) = feed_server(ResponseTemplate::new(200).set_body_string(body)).await;
    let mut wizard = Wizard::setup(fetcher(), url);

    let outcome = wizard.select_group(None).await;
    assert!(expect_form(&outcome).choices.is_empty());

    let outcome = wizard.select_group(None).await;
    assert!(expect_form(&outcome).choices.is_empty());
    // The empty identifier set is cached like any other
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let outcome = wizard
        .select_group(Some(GroupInput {
            identifier: "1234".into(),
        }))
        .await;
    assert_eq!(expect_form(&outcome).step, WizardStep::SelectDetail);
    // Only the detail step refetched
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    let outcome = wizard
        .select_detail(Some(DetailInput {
            station: "Anywhere".into(),
            count: 3,
        }))
        .await;
    assert!(matches!(outcome, StepOutcome::Complete(ref s) if s.identifier == "1234"));
}

// ============================================================================
// Fetch failures
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_on_group_step() {
    let (server, url) = feed_server(ResponseTemplate::new(500)).await;
    let mut wizard = Wizard::setup(fetcher(), url);

    let outcome = wizard.select_group(None).await;
    let form = expect_form(&outcome);
    assert_eq!(form.step, WizardStep::SelectGroup);
    assert_eq!(form.error, Some(FormError::FetchError));
    assert!(form.choices.is_empty());
    assert_eq!(wizard.step(), WizardStep::SelectGroup);

    // One call exhausts the three attempts
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_fetch_failure_on_detail_step_then_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(mixed_feed())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(mixed_feed())
        .mount(&server)
        .await;

    let mut wizard = Wizard::setup(fetcher(), format!("{}/rss", server.uri()));
    let outcome = wizard.select_group(None).await;
    assert_eq!(expect_form(&outcome).error, None);

    let outcome = wizard
        .select_group(Some(GroupInput {
            identifier: "4001".into(),
        }))
        .await;
    let form = expect_form(&outcome);
    assert_eq!(form.step, WizardStep::SelectDetail);
    assert_eq!(form.error, Some(FormError::FetchError));
    assert_eq!(wizard.step(), WizardStep::SelectDetail);
    assert_eq!(wizard.selected_identifier(), Some("4001"));

    let outcome = wizard.select_detail(None).await;
    let form = expect_form(&outcome);
    assert_eq!(form.error, None);
    assert_eq!(form.choices, vec!["BrandNord", "BrandSyd"]);
}

// ============================================================================
// Reconfigure
// ============================================================================

#[tokio::test]
async fn test_reconfigure_defaults_to_current_settings() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let current = FeedSettings::new("5002", "Vest", 12)
        .with_feed_url(url.as_str())
        .with_local_filter(true);
    let mut wizard = Wizard::reconfigure(fetcher(), current);

    let outcome = wizard.select_group(None).await;
    assert_eq!(expect_form(&outcome).default_choice.as_deref(), Some("5002"));

    let outcome = wizard
        .select_group(Some(GroupInput {
            identifier: "5002".into(),
        }))
        .await;
    let form = expect_form(&outcome);
    assert_eq!(form.default_choice.as_deref(), Some("Vest"));
    assert_eq!(form.count.map(|c| c.default), Some(12));

    let outcome = wizard
        .select_detail(Some(DetailInput {
            station: "Vest".into(),
            count: 3,
        }))
        .await;
    let StepOutcome::Complete(settings) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(settings.count, 3);
    assert_eq!(settings.feed_url, url);
    assert!(settings.local_filter);
}

#[tokio::test]
async fn test_start_in_reconfigure_mode_uses_current_feed() {
    let (_server, url) = feed_server(mixed_feed()).await;
    let current = FeedSettings::new("4001", "BrandSyd", 7).with_feed_url(url.as_str());
    let mut wizard = Wizard::start(
        fetcher(),
        "http://127.0.0.1:9/unused",
        WizardMode::Reconfigure(current.clone()),
    );
    assert_eq!(wizard.mode(), &WizardMode::Reconfigure(current));

    let outcome = wizard.select_group(None).await;
    let form = expect_form(&outcome);
    assert_eq!(form.error, None);
    assert_eq!(form.default_choice.as_deref(), Some("4001"));
}

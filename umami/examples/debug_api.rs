use serde_json::Value;
use std::env;
use umami::types::{Dimension, MetricEntry, PageViews};
use umami::{Credentials, Error, UmamiApi, UmamiClient};

/// Attempts to convert a payload and shows error info on failure
fn try_parse<T: serde::de::DeserializeOwned>(value: &Value, type_name: &str) {
    println!("\n>>> Attempting to parse as {type_name} <<<");
    match serde_json::from_value::<T>(value.clone()) {
        Ok(_) => println!("SUCCESS: Parsed {type_name} correctly"),
        Err(e) => println!("FAILED: {e}"),
    }
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

fn report(result: Result<Value, Error>) -> Option<Value> {
    match result {
        Ok(value) => {
            let len = value.to_string().len();
            println!("Response length: {len} bytes");
            Some(value)
        }
        Err(e) => {
            println!("Request failed: {e}");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let var = |name: &str| {
        env::var(name).unwrap_or_else(|_| panic!("{name} environment variable not set"))
    };
    let client = UmamiClient::new(
        var("UMAMI_URL"),
        Credentials::new(var("UMAMI_USERNAME"), var("UMAMI_PASSWORD")),
        var("UMAMI_WEBSITE_ID"),
    );

    banner("TEST 1: GET /api/websites/{id}/stats");
    if let Some(stats) = report(client.get_stats(Some(7)).await) {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
    }

    banner("TEST 2: GET /api/websites/{id}/metrics?type=path");
    if let Some(metrics) = report(client.get_page_metrics(Some(7), None).await) {
        try_parse::<Vec<MetricEntry>>(&metrics, "Vec<MetricEntry>");
    }

    for dimension in Dimension::ALL {
        banner(&format!("TEST 3: GET /api/websites/{{id}}/metrics?type={dimension}"));
        if let Some(metrics) = report(client.get_dimension(dimension, Some(7)).await) {
            try_parse::<Vec<MetricEntry>>(&metrics, "Vec<MetricEntry>");
        }
    }

    banner("TEST 4: GET /api/websites/{id}/pageviews");
    if let Some(views) = report(client.get_page_views(None, None, Some(7)).await) {
        try_parse::<PageViews>(&views, "PageViews");
    }

    banner("TEST 5: GET /api/websites/{id}/active");
    if let Some(active) = report(client.get_active_users().await) {
        println!("{active}");
    }
}

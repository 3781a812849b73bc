use scout_client::{Response, StatsSnapshot};
use scout_tenancy::MultiTenancyStrategy;
use serde_json::Value;

fn pretty(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

pub fn print_ping(resp: &Response) {
    let body = resp.body();
    let field = |path: &[&str]| {
        let mut v = body?;
        for key in path {
            v = v.get(key)?;
        }
        v.as_str().map(str::to_string)
    };

    println!("\n=== Search Node ===");
    println!("  {:<12} {}", "Host", resp.host());
    println!("  {:<12} {} {}", "Status", resp.status_code(), resp.status_text());
    println!(
        "  {:<12} {}",
        "Cluster",
        field(&["cluster_name"]).unwrap_or_else(|| "N/A".to_string())
    );
    println!(
        "  {:<12} {}",
        "Version",
        field(&["version", "number"]).unwrap_or_else(|| "N/A".to_string())
    );
    println!();
}

pub fn print_response(resp: &Response) {
    println!("{} {}", resp.status_code(), resp.status_text());
    if let Some(body) = resp.body() {
        println!("{}", pretty(body));
    }
}

pub fn print_hits(resp: &Response, tenancy: &dyn MultiTenancyStrategy) {
    let Some(body) = resp.body() else {
        println!("(empty response)");
        return;
    };
    let total = body["hits"]["total"]["value"]
        .as_u64()
        .or_else(|| body["hits"]["total"].as_u64());
    let hits = body["hits"]["hits"].as_array().cloned().unwrap_or_default();

    println!("\n=== Hits ({}) ===", total.map_or_else(|| "?".to_string(), |t| t.to_string()));
    if hits.is_empty() {
        println!("  (No matching documents)");
        println!();
        return;
    }
    println!("  {:<24} {:<8} {}", "ID", "Score", "Source");
    for hit in &hits {
        let id = tenancy.extract_id(hit).unwrap_or_else(|| "N/A".to_string());
        let score = hit["_score"]
            .as_f64()
            .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
        let source = hit.get("_source").map(Value::to_string).unwrap_or_default();
        println!("  {:<24} {:<8} {}", id, score, source);
    }
    println!();
}

pub fn print_index_summary(total: usize, failures: &[(String, String)], stats: &StatsSnapshot) {
    println!("\n=== Indexing Summary ===");
    println!("  {:<12} {}", "Events", total);
    println!("  {:<12} {}", "Succeeded", total - failures.len());
    println!("  {:<12} {}", "Failed", failures.len());
    println!("  {:<12} {}", "Requests", stats.submitted_total);
    for (what, why) in failures {
        println!("  ✗ {what}: {why}");
    }
    println!();
}

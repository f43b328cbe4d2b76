//! `cadence cache-policy` — Show the effective tool cache policy.

use cadence_agent::CachePolicy;
use cadence_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let policy = CachePolicy::from_config(&config.cache);

    println!("Tool cache policy");
    println!("=================");
    println!("  Max entries:  {}", config.cache.max_size);
    println!("  Default TTL:  {}s", policy.default_ttl().as_secs());

    println!("\n  Per-tool TTLs:");
    for (tool, ttl) in policy.ttl_table() {
        println!("    {tool:<24} {}s", ttl.as_secs());
    }

    println!("\n  Never cached:");
    for tool in policy.non_cacheable_tools() {
        println!("    {tool}");
    }
    Ok(())
}

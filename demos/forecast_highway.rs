//! Forecasts traffic on a highway segment for the next seven hours,
//! using today's 06:00 village forecast for Seoul (grid 60, 127).
//!
//! Requires `KMA_SERVICE_KEY` and a traffic export at
//! `data/ETC_P7_07_04_516342.csv` with the columns `날짜컬럼` and `교통량`.

use chrono::Local;
use highway_forecast::{
    ForecastConfig, ForecastError, ForecastOrchestrator, ForecastParams, TrafficColumns,
    TrafficSourceConfig, WeatherClientConfig,
};

#[tokio::main]
async fn main() -> Result<(), ForecastError> {
    let config = ForecastConfig::builder()
        .weather(WeatherClientConfig::from_env()?)
        .traffic(
            TrafficSourceConfig::builder()
                .path("data/ETC_P7_07_04_516342.csv")
                .columns(
                    TrafficColumns::builder()
                        .timestamp("날짜컬럼")
                        .volume("교통량")
                        .build(),
                )
                .build(),
        )
        .build();
    let orchestrator = ForecastOrchestrator::from_config(config)?;

    let params = ForecastParams::builder()
        .grid_x(60)
        .grid_y(127)
        .base_date(Local::now().format("%Y%m%d").to_string())
        .base_time("0600")
        .horizon(7)
        .build();
    let result = orchestrator.run(&params).await?;

    println!("Forecast origin: {}", result.origin);
    if let Some(explanation) = &result.explanation {
        println!("Fallback reason: {explanation}");
    }
    for warning in &result.warnings {
        println!("Warning: {warning}");
    }
    for point in &result.horizon_points {
        println!(
            "{}  {:>8.0} vehicles",
            point.timestamp.format("%Y-%m-%d %H:%M"),
            point.predicted_traffic_volume
        );
    }

    Ok(())
}

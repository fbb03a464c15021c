pub mod forecast_result;
pub mod merged_record;
pub mod observation;
pub mod weather_category;

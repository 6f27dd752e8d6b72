pub mod chips;
pub mod config;
pub mod http_cache;
pub mod http_client;
pub mod points_model;
pub mod position;
pub mod rules;
pub mod season;
pub mod season_csv;
pub mod season_data;
pub mod season_db;
pub mod season_export;
pub mod selection;
pub mod squad;

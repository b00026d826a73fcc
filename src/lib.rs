pub mod ai_client;
pub mod db;
pub mod generator;
pub mod pdf_extractor;
pub mod settings;
pub mod utils;
pub mod web;

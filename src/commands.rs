pub mod cluster;
pub mod files;
pub mod generate;
pub mod history;
pub mod render;
pub mod review;
pub mod score;
pub mod show;
pub mod status;
pub mod table;
pub mod workspace;

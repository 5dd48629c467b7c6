pub mod bilibili;
pub mod db;

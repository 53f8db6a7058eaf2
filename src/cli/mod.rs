pub mod roleplay;

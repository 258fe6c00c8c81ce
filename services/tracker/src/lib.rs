pub mod adapters;
pub mod config;
pub mod controller;
pub mod error;
pub mod repository;
pub mod session;
pub mod view;
pub mod web;

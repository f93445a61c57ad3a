//! The three rewrite passes applied to a generated stub tree, in pipeline
//! order: controller builder synthesis, domain-model record synthesis, and
//! marker-annotation binding.

pub mod bindings;
pub mod controllers;
pub mod models;

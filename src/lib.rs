//! Skirmish - tick-based arena battles between user-scripted agents

pub mod agent;
pub mod battle;
pub mod core;

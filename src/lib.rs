// ABOUTME: Root library module for the ordo binary
// ABOUTME: Configuration, XDG paths, the console platform and built-in commands

pub mod commands;
pub mod config;
pub mod console;
pub mod paths;

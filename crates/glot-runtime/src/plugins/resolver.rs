//! Dependency resolution and load ordering.
//!
//! Flags plugins whose language module or dependencies cannot be
//! satisfied, contains dependency cycles, and emits a deterministic
//! load order (dependencies first, discovery order as tie-break).

use crate::plugins::module::Module;
use crate::plugins::plugin::{Plugin, PluginState};
use glot_manifest::platform;
use std::collections::HashMap;

/// Run all resolution passes and return the indices of loadable plugins in
/// load order. Unsatisfiable plugins are left in the `Error` state.
pub(crate) fn resolve_load_order(plugins: &mut [Plugin], modules: &[Module]) -> Vec<usize> {
    check_language_modules(plugins, modules);
    check_dependencies(plugins);
    mark_cycles(plugins);
    build_order(plugins)
}

fn check_language_modules(plugins: &mut [Plugin], modules: &[Module]) {
    for plugin in plugins.iter_mut() {
        if plugin.state() == PluginState::Error {
            continue;
        }
        let lang = plugin.descriptor().language_module.name.clone();
        if !modules.iter().any(|m| m.language() == lang) {
            plugin.set_error(format!("Language module '{}' was not found", lang));
        }
    }
}

fn check_dependencies(plugins: &mut [Plugin]) {
    let versions: HashMap<String, i32> = plugins
        .iter()
        .map(|p| (p.name().to_string(), p.descriptor().version))
        .collect();

    for plugin in plugins.iter_mut() {
        if plugin.state() == PluginState::Error {
            continue;
        }
        let mut failure: Option<String> = None;
        for dependency in &plugin.descriptor().dependencies {
            if dependency.optional || !platform::supports(&dependency.supported_platforms) {
                continue;
            }
            match versions.get(&dependency.name) {
                None => {
                    failure = Some(format!(
                        "Dependency '{}' was not found",
                        dependency.name
                    ));
                    break;
                }
                Some(installed) => {
                    if let Some(requested) = dependency.requested_version {
                        if requested != *installed {
                            failure = Some(format!(
                                "Dependency '{}' requires version (v{}), but (v{}) is installed",
                                dependency.name, requested, installed
                            ));
                            break;
                        }
                    }
                }
            }
        }
        if let Some(error) = failure {
            plugin.set_error(error);
        }
    }
}

/// Edges point from a plugin to the plugins it depends on. Optional
/// dependencies participate only when present.
fn adjacency(plugins: &[Plugin]) -> Vec<Vec<usize>> {
    let index: HashMap<&str, usize> = plugins
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name(), i))
        .collect();

    plugins
        .iter()
        .map(|plugin| {
            plugin
                .descriptor()
                .dependencies
                .iter()
                .filter(|d| platform::supports(&d.supported_platforms))
                .filter_map(|d| index.get(d.name.as_str()).copied())
                .collect()
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

fn mark_cycles(plugins: &mut [Plugin]) {
    let edges = adjacency(plugins);
    let mut colors = vec![Color::White; plugins.len()];
    let mut stack: Vec<usize> = Vec::new();
    let mut cyclic: Vec<bool> = vec![false; plugins.len()];

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        colors: &mut [Color],
        stack: &mut Vec<usize>,
        cyclic: &mut [bool],
    ) {
        colors[node] = Color::Gray;
        stack.push(node);
        for &next in &edges[node] {
            match colors[next] {
                Color::White => visit(next, edges, colors, stack, cyclic),
                Color::Gray => {
                    // Back-edge: everything on the stack from `next` down is
                    // part of the cycle.
                    let from = stack.iter().position(|&n| n == next).unwrap_or(0);
                    for &member in &stack[from..] {
                        cyclic[member] = true;
                    }
                }
                Color::Black => {}
            }
        }
        stack.pop();
        colors[node] = Color::Black;
    }

    for node in 0..plugins.len() {
        if colors[node] == Color::White {
            visit(node, &edges, &mut colors, &mut stack, &mut cyclic);
        }
    }

    for (node, is_cyclic) in cyclic.iter().enumerate() {
        if *is_cyclic && plugins[node].state() != PluginState::Error {
            plugins[node].set_error("Cyclic dependency detected");
        }
    }
}

/// Dependencies-first post-order over the non-error plugins.
fn build_order(plugins: &[Plugin]) -> Vec<usize> {
    let edges = adjacency(plugins);
    let mut visited = vec![false; plugins.len()];
    let mut order: Vec<usize> = Vec::with_capacity(plugins.len());

    fn visit(
        node: usize,
        plugins: &[Plugin],
        edges: &[Vec<usize>],
        visited: &mut [bool],
        order: &mut Vec<usize>,
    ) {
        visited[node] = true;
        for &next in &edges[node] {
            if !visited[next] && plugins[next].state() != PluginState::Error {
                visit(next, plugins, edges, visited, order);
            }
        }
        order.push(node);
    }

    for node in 0..plugins.len() {
        if !visited[node] && plugins[node].state() != PluginState::Error {
            visit(node, plugins, &edges, &mut visited, &mut order);
        }
    }

    order
}

//! Shared shader program cache
//!
//! Materials built from identical shader sources share one linked program.
//! Entries are reference-counted: [`ProgramCache::acquire`] takes a reference
//! and [`ProgramCache::release`] drops one, deleting the GPU program when the
//! last user lets go. A material deleting its program therefore never pulls
//! it out from under a sibling.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use log::{debug, error};

use super::backend::{GpuBackend, ProgramHandle, ShaderStage};

/// Cache key derived from a vertex/fragment source pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey(u64);

impl ProgramKey {
    /// Hash a pair of shader sources
    pub fn new(vertex_source: &str, fragment_source: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        vertex_source.hash(&mut hasher);
        fragment_source.hash(&mut hasher);
        Self(hasher.finish())
    }
}

#[derive(Debug)]
struct CachedProgram {
    handle: ProgramHandle,
    refs: usize,
}

/// Reference-counted program cache owned by a render context
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<ProgramKey, CachedProgram>,
}

impl ProgramCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (compiling if needed) the program for `key` and take a reference
    pub fn acquire(
        &mut self,
        gpu: &mut dyn GpuBackend,
        key: ProgramKey,
        vertex_source: &str,
        fragment_source: &str,
    ) -> ProgramHandle {
        let entry = self.programs.entry(key).or_insert_with(|| CachedProgram {
            handle: compile_program(gpu, vertex_source, fragment_source),
            refs: 0,
        });
        entry.refs += 1;
        entry.handle
    }

    /// Compile the program for `key` without taking a reference
    ///
    /// Warmed programs stay cached until acquired and released, or until
    /// [`purge_unused`](Self::purge_unused) runs.
    pub fn warm(
        &mut self,
        gpu: &mut dyn GpuBackend,
        key: ProgramKey,
        vertex_source: &str,
        fragment_source: &str,
    ) {
        self.programs.entry(key).or_insert_with(|| CachedProgram {
            handle: compile_program(gpu, vertex_source, fragment_source),
            refs: 0,
        });
    }

    /// Drop one reference, deleting the program when none remain
    pub fn release(&mut self, gpu: &mut dyn GpuBackend, key: ProgramKey) {
        let Some(entry) = self.programs.get_mut(&key) else {
            return;
        };

        entry.refs = entry.refs.saturating_sub(1);

        if entry.refs == 0 {
            debug!("Deleting unreferenced program {:?}", entry.handle);
            gpu.delete_program(entry.handle);
            self.programs.remove(&key);
        }
    }

    /// Delete every program nobody holds a reference to
    pub fn purge_unused(&mut self, gpu: &mut dyn GpuBackend) {
        self.programs.retain(|_, entry| {
            if entry.refs == 0 {
                gpu.delete_program(entry.handle);
                false
            } else {
                true
            }
        });
    }

    /// Whether a program for `key` exists
    pub fn contains(&self, key: ProgramKey) -> bool {
        self.programs.contains_key(&key)
    }

    /// Number of materials holding the program for `key`
    pub fn ref_count(&self, key: ProgramKey) -> usize {
        self.programs.get(&key).map_or(0, |entry| entry.refs)
    }

    /// Number of cached programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Compile both stages and link them; failures are logged, not returned
fn compile_program(gpu: &mut dyn GpuBackend, vertex_source: &str, fragment_source: &str) -> ProgramHandle {
    let vertex = gpu.compile_shader(ShaderStage::Vertex, vertex_source);
    if !gpu.shader_compile_status(vertex) {
        error!("Vertex shader compilation failed: {}", gpu.shader_info_log(vertex));
    }

    let fragment = gpu.compile_shader(ShaderStage::Fragment, fragment_source);
    if !gpu.shader_compile_status(fragment) {
        error!("Fragment shader compilation failed: {}", gpu.shader_info_log(fragment));
    }

    let program = gpu.link_program(vertex, fragment);
    if !gpu.program_link_status(program) {
        error!("Program linking failed: {}", gpu.program_info_log(program));
    }

    gpu.delete_shader(vertex);
    gpu.delete_shader(fragment);

    program
}

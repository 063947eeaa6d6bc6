//! Subtree-scoped uniform values

use crate::render::{Material, UniformValue};

/// Uniform values applied to every renderable below this node
///
/// Providers are applied root to leaf, so a provider nearer the renderable
/// wins over a farther one for the same name.
#[derive(Debug, Clone, Default)]
pub struct UniformProvider {
    uniforms: Vec<(String, UniformValue)>,
}

impl UniformProvider {
    /// Provider with initial values
    pub fn new<I, K, V>(uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UniformValue>,
    {
        let mut provider = Self::default();
        provider.set_uniforms(uniforms);
        provider
    }

    /// Set or replace one value
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        let name = name.into();
        let value = value.into();
        match self.uniforms.iter_mut().find(|(n, _)| *n == name) {
            Some((_, current)) => *current = value,
            None => self.uniforms.push((name, value)),
        }
    }

    /// Set or replace several values
    pub fn set_uniforms<I, K, V>(&mut self, uniforms: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UniformValue>,
    {
        for (name, value) in uniforms {
            self.set_uniform(name, value);
        }
    }

    /// Current value of a uniform
    pub fn get_uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Push every value onto `material`
    pub fn apply_to(&self, material: &mut Material) {
        material.set_uniforms(self.uniforms.iter().map(|(name, value)| (name, value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_uniform_replaces() {
        let mut provider = UniformProvider::new([("u_fAlpha", 0.5)]);
        provider.set_uniform("u_fAlpha", 1.0);
        assert_eq!(provider.uniforms.len(), 1);
        assert!(matches!(provider.get_uniform("u_fAlpha"), Some(UniformValue::Float(v)) if *v == 1.0));
    }

    #[test]
    fn test_apply_queues_on_uncompiled_material() {
        let provider = UniformProvider::new([("u_fAlpha", 0.25)]);
        let mut material = Material::default();
        provider.apply_to(&mut material);
        assert!(matches!(material.get_uniform("u_fAlpha"), Some(UniformValue::Float(v)) if *v == 0.25));
    }
}

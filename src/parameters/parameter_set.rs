//! Ordered collection of uniquely named parameters.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::parameters::bounds::Bounds;
use crate::parameters::parameter::{Parameter, ParameterError};

/// An ordered mapping of unique names to [`Parameter`]s.
///
/// Insertion order is kept; it defines the column order of the Jacobian and
/// the order of the optimizer's parameter vector (varying parameters only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Parameter>", into = "Vec<Parameter>")]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// Create a new empty parameter set
    ///
    /// # Examples
    ///
    /// ```
    /// use fedbatch_fit::parameters::ParameterSet;
    ///
    /// let mut params = ParameterSet::new();
    /// params.add_bounded("mumax", 0.5, 1e-4, 1.0).unwrap();
    /// params.add_fixed("Ks", 1.0).unwrap();
    /// assert_eq!(params.len(), 2);
    /// assert_eq!(params.varying_names(), vec!["mumax"]);
    /// ```
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter, rejecting duplicate names.
    pub fn add(&mut self, param: Parameter) -> Result<(), ParameterError> {
        if self.get(param.name()).is_some() {
            return Err(ParameterError::Duplicate {
                name: param.name().to_string(),
            });
        }
        self.params.push(param);
        Ok(())
    }

    pub fn add_param(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.add(Parameter::new(name, value)?)
    }

    pub fn add_bounded(
        &mut self,
        name: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ParameterError> {
        self.add(Parameter::bounded(name, value, min, max)?)
    }

    pub fn add_fixed(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.add(Parameter::fixed(name, value)?)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name() == name)
    }

    /// Value of a named parameter.
    pub fn value(&self, name: &str) -> Result<f64, ParameterError> {
        self.get(name)
            .map(Parameter::value)
            .ok_or_else(|| ParameterError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Check every parameter's invariants.
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.params.iter().try_for_each(Parameter::validate)
    }

    pub fn varying(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| !p.is_fixed())
    }

    pub fn varying_count(&self) -> usize {
        self.varying().count()
    }

    pub fn varying_names(&self) -> Vec<&str> {
        self.varying().map(Parameter::name).collect()
    }

    /// External values of the varying parameters, in set order.
    pub fn varying_values(&self) -> Array1<f64> {
        self.varying().map(Parameter::value).collect()
    }

    /// Bounds of the varying parameters, in set order.
    pub fn varying_bounds(&self) -> Vec<Bounds> {
        self.varying().map(Parameter::bounds).collect()
    }

    /// Internal (unbounded) optimizer coordinates of the varying parameters.
    pub fn to_internal(&self) -> Result<Array1<f64>, ParameterError> {
        self.varying()
            .map(Parameter::internal_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from_vec)
    }

    /// A candidate set whose varying parameters are taken from internal
    /// optimizer coordinates. The result always satisfies the bounds.
    pub fn with_internal(&self, internal: &Array1<f64>) -> Result<Self, ParameterError> {
        self.check_varying_len(internal.len())?;
        let mut candidate = self.clone();
        for (param, &x) in candidate
            .params
            .iter_mut()
            .filter(|p| !p.is_fixed())
            .zip(internal.iter())
        {
            let external = param.transform().to_external(x);
            param.set_value(external)?;
        }
        Ok(candidate)
    }

    /// A candidate set with the given external values for the varying parameters.
    pub fn with_varying_values(&self, values: &Array1<f64>) -> Result<Self, ParameterError> {
        self.check_varying_len(values.len())?;
        let mut candidate = self.clone();
        for (param, &v) in candidate
            .params
            .iter_mut()
            .filter(|p| !p.is_fixed())
            .zip(values.iter())
        {
            param.set_value(v)?;
        }
        Ok(candidate)
    }

    /// Clear all standard errors.
    pub fn clear_stderr(&mut self) {
        for param in self.params.iter_mut() {
            param.set_stderr(None);
        }
    }

    fn check_varying_len(&self, actual: usize) -> Result<(), ParameterError> {
        let expected = self.varying_count();
        if actual != expected {
            return Err(ParameterError::VaryingCount { expected, actual });
        }
        Ok(())
    }
}

impl TryFrom<Vec<Parameter>> for ParameterSet {
    type Error = ParameterError;

    fn try_from(params: Vec<Parameter>) -> Result<Self, Self::Error> {
        let mut set = ParameterSet::new();
        for param in params {
            set.add(param)?;
        }
        Ok(set)
    }
}

impl From<ParameterSet> for Vec<Parameter> {
    fn from(set: ParameterSet) -> Self {
        set.params
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

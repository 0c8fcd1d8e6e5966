//! Uncontrolled name-value parameters attached to spectra and their
//! sub-structures, such as the per-precursor `MultiFillTime` used by
//! variable-fill acquisition methods.
use std::fmt::Display;
use std::str::{self, FromStr};

/// A user-defined parameter: a free-text name and a free-text value that can
/// be re-interpreted as a more specific type on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserParam {
    pub name: String,
    pub value: String,
}

impl UserParam {
    pub fn new<N: ToString, V: ToString>(name: N, value: V) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Re-parse the value as `T`
    pub fn value_as<T: FromStr>(&self) -> Result<T, T::Err> {
        self.value.parse()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl Display for UserParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

pub type ParamList = Vec<UserParam>;

/// Things that carry a list of [`UserParam`]s
pub trait ParamDescribed {
    fn params(&self) -> &[UserParam];
    fn params_mut(&mut self) -> &mut ParamList;

    /// Find a parameter by name
    fn user_param(&self, name: &str) -> Option<&UserParam> {
        self.params().iter().find(|p| p.name == name)
    }

    fn add_param(&mut self, param: UserParam) {
        self.params_mut().push(param)
    }
}

/// Implement `ParamDescribed` for a type with a `params: ParamList` field
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(
        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &[$crate::params::UserParam] {
                &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                &mut self.params
            }
        }
    )+};
}

pub(crate) use impl_param_described;

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Holder {
        params: ParamList,
    }

    impl_param_described!(Holder);

    #[test]
    fn test_user_param_lookup() {
        let mut holder = Holder::default();
        holder.add_param(UserParam::new("MultiFillTime", 32.5));
        assert!(holder.user_param("FillTime").is_none());
        let p = holder.user_param("MultiFillTime").unwrap();
        assert_eq!(p.value_as::<f64>().unwrap(), 32.5);
        assert_eq!(p.to_string(), "MultiFillTime=32.5");
    }
}

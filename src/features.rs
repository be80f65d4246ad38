//! Enumerated capability flags that gate parse-time acceptance (C1). Feature
//! checks are pure parse-time predicates: they reject programs, never modify
//! them.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    flags: u32,
    const_capture: bool,
    reserved: HashSet<String>,
}

macro_rules! feature_bits {
    ($($name:ident = $bit:expr => $flag:ident, $flag_mut:ident;)*) => {
        $(pub const $name: u32 = 1 << $bit;)*

        impl FeatureSet {
            $(
                pub fn $flag(&self) -> bool {
                    self.flags & $name != 0
                }

                pub fn $flag_mut(&mut self, enabled: bool) -> &mut Self {
                    if enabled {
                        self.flags |= $name;
                    } else {
                        self.flags &= !$name;
                    }
                    self
                }
            )*
        }
    };
}

feature_bits! {
    SCRIPT              = 0  => script, set_script;
    SIDE_EFFECT         = 1  => side_effect, set_side_effect;
    SIDE_EFFECT_GLOBAL  = 2  => side_effect_global, set_side_effect_global;
    LOCAL_VAR           = 3  => local_var, set_local_var;
    LOOPS               = 4  => loops, set_loops;
    LAMBDA              = 5  => lambda, set_lambda;
    NEW_INSTANCE        = 6  => new_instance, set_new_instance;
    METHOD_CALL         = 7  => method_call, set_method_call;
    STRUCTURED_LITERAL  = 8  => structured_literal, set_structured_literal;
    ARRAY_REF_EXPR      = 9  => array_reference_expr, set_array_reference_expr;
    PRAGMA              = 10 => pragma, set_pragma;
    PRAGMA_ANYWHERE     = 11 => pragma_anywhere, set_pragma_anywhere;
    ANNOTATION          = 12 => annotation, set_annotation;
    COMPARATOR_NAMES    = 13 => comparator_names, set_comparator_names;
    FAT_ARROW           = 14 => fat_arrow, set_fat_arrow;
    IMPORT_PRAGMA       = 15 => import_pragma, set_import_pragma;
    NAMESPACE_PRAGMA    = 16 => namespace_pragma, set_namespace_pragma;
    LEXICAL             = 17 => lexical, set_lexical;
    LEXICAL_SHADE       = 18 => lexical_shade, set_lexical_shade;
    AMBIGUOUS_STATEMENT = 19 => ambiguous_statement, set_ambiguous_statement;
    ANTISH              = 20 => antish, set_antish;
}

impl FeatureSet {
    /// All features on, `constCapture` on, nothing reserved: the permissive
    /// default a host starts from and narrows.
    pub fn all() -> Self {
        FeatureSet {
            flags: (1 << 21) - 1,
            const_capture: true,
            reserved: HashSet::new(),
        }
    }

    pub fn const_capture(&self) -> bool {
        self.const_capture
    }

    pub fn set_const_capture(&mut self, enabled: bool) -> &mut Self {
        self.const_capture = enabled;
        self
    }

    /// `reservedNames`: names that may not be used in a *declaration*
    /// (`var`/`let`/`const`/parameter). Using them elsewhere is unaffected.
    pub fn with_reserved_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.reserved = names.into_iter().collect();
        self
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// `F' ⊇ F` monotonicity: a program accepted under `self` is also
    /// accepted under any `other` that is a superset of enabled
    /// flags/reserved names.
    pub fn is_subset_of(&self, other: &FeatureSet) -> bool {
        (self.flags & !other.flags) == 0 && self.reserved.is_subset(&other.reserved)
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        FeatureSet::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let mut f = FeatureSet::all();
        assert!(f.loops());
        f.set_loops(false);
        assert!(!f.loops());
    }

    #[test]
    fn reserved_names() {
        let f = FeatureSet::all().with_reserved_names(["class".to_string()]);
        assert!(f.is_reserved("class"));
        assert!(!f.is_reserved("x"));
    }

    #[test]
    fn monotonicity() {
        let mut small = FeatureSet::all();
        small.set_lambda(false);
        let big = FeatureSet::all();
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
    }
}

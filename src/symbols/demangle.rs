use crate::metastore::Function;

/// Demangler demangles GCC/LLVM C++ and Rust symbol names.
///
/// Profilers frequently only know the linker symbol of a frame. The demangled
/// form becomes the function's display name while the raw symbol stays in
/// `system_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Demangler {
    force: bool,
}

impl Demangler {
    /// If force is set, names that already look demangled are recomputed from
    /// the system name.
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn demangle(&self, function: &Function) -> Function {
        let mut new_function = function.clone();

        if function.system_name.is_empty() {
            return new_function;
        }

        if !self.force && !function.name.is_empty() && function.name != function.system_name {
            return new_function; // Already demangled
        }

        new_function.name = Self::filter(&function.system_name);
        new_function
    }

    // Returns the human-readable Rust or C++ name, or the input if it is
    // neither.
    fn filter(sys_name: &str) -> String {
        if let Ok(demangled) = rustc_demangle::try_demangle(sys_name) {
            return format!("{:#}", demangled);
        }

        if let Ok(symbol) = cpp_demangle::Symbol::new(sys_name) {
            return symbol.to_string();
        }

        sys_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, system_name: &str) -> Function {
        Function {
            name: name.to_string(),
            system_name: system_name.to_string(),
            filename: "".to_string(),
            start_line: 0,
        }
    }

    #[test]
    fn test_already_demangled() {
        let demangler = Demangler::new(false);
        let f = function("main", "main");
        assert_eq!(f, demangler.demangle(&f));

        let f = function("std::allocator<char>::allocator", "_ZNSaIcEC1ERKS_");
        assert_eq!(f, demangler.demangle(&f));
    }

    #[test]
    fn test_cpp() {
        let demangler = Demangler::new(false);
        let demangled = demangler.demangle(&function("", "_ZNSaIcEC1ERKS_"));
        assert_eq!(
            "std::allocator<char>::allocator(std::allocator<char> const&)",
            demangled.name
        );
        assert_eq!("_ZNSaIcEC1ERKS_", demangled.system_name);
    }

    #[test]
    fn test_rust() {
        let demangler = Demangler::new(false);
        let demangled = demangler.demangle(&function(
            "",
            "_ZN11collections5slice29_$LT$impl$u20$$u5b$T$u5d$$GT$10as_mut_ptr17hf12a6d0409938c96E",
        ));
        assert_eq!("collections::slice::<impl [T]>::as_mut_ptr", demangled.name);
    }

    #[test]
    fn test_force() {
        let f = function("alloc", "_ZNSaIcEC1ERKS_");
        assert_eq!("alloc", Demangler::new(false).demangle(&f).name);
        assert_eq!(
            "std::allocator<char>::allocator(std::allocator<char> const&)",
            Demangler::new(true).demangle(&f).name
        );
    }
}

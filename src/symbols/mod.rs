mod demangle;

pub use demangle::Demangler;

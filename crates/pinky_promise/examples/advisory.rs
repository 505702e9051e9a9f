//! Installation advisory: which promise libraries are available?
//!
//! Checks whether any supported third-party library resolves and prints a
//! recommendation when only the built-in implementation is left.

use pinky_promise::{Resolver, Selector, SUPPORTED_LIBRARIES};

fn main() {
    let resolver = Resolver::new();

    let available: Vec<&str> = SUPPORTED_LIBRARIES
        .iter()
        .copied()
        .filter(|name| resolver.resolve(Some(Selector::library(*name))).is_ok())
        .collect();

    if available.is_empty() {
        eprintln!("No third-party promise library could be loaded.");
        eprintln!("Consider enabling one of the following:");
        eprintln!("{}", resolver.suggested_libraries(Some(3)));
        return;
    }

    println!("Available promise libraries:");
    for name in &available {
        println!("  - {name}");
    }
    println!();
    println!("All supported libraries:");
    println!("{}", resolver.suggested_libraries(None));
}

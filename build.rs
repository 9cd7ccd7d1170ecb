fn main() {
    println!("cargo:rerun-if-changed=pinpad.json");

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}

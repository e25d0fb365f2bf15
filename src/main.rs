fn main() {
    formpilot_lib::run()
}

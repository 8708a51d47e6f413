fn main() {
    object_voice::run_cli();
}

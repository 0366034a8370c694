/// Strips markup from user-supplied profile text.
///
/// Uses ammonia's whitelist: safe inline tags survive, `<script>` and friends
/// are removed along with event-handler attributes.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

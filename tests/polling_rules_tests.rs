//! End-to-end rules from page markup to the next scheduled check
use volume_guard_lib::domain::constants::portal::{REFILL_BLOCK, USAGE_BLOCK};
use volume_guard_lib::domain::{AdaptiveScheduler, PollResult, SleepMode};
use volume_guard_lib::infrastructure::usage_parser::parse_usage_block;

fn overview_page(primary: (&str, &str), refill: Option<(&str, &str)>) -> String {
    let refill = refill.map_or_else(String::new, |(used, total)| {
        format!(
            r#"<div class="refill-wrapper"><div class="consumption-info">
                 <span>{used}</span> von <span>{total}</span> <span class="unit">GB</span>
               </div></div>"#
        )
    });
    format!(
        r#"<html><body>
             <div class="consumption-info">
               <span>{}</span> von <span>{}</span> <span class="unit">GB</span>
             </div>
             {refill}
           </body></html>"#,
        primary.0, primary.1
    )
}

fn poll(html: &str) -> PollResult {
    let primary = parse_usage_block(html, USAGE_BLOCK).expect("usage block present");
    let refill = parse_usage_block(html, REFILL_BLOCK);
    PollResult::from_readings(&primary, refill.as_ref())
}

#[test]
fn plenty_left_waits_in_the_matching_tier() {
    let result = poll(&overview_page(("2,5", "10"), None));
    assert_eq!(result.available_gb, 7.5);
    assert!(!result.needs_top_up());

    let secs = AdaptiveScheduler::new(SleepMode::Smart)
        .next_interval(result.scheduling_value())
        .as_secs();
    assert!((900..1800).contains(&secs), "{secs}");
}

#[test]
fn refill_volume_lifts_the_total_above_the_top_up_line() {
    let result = poll(&overview_page(("9,8", "10"), Some(("0", "1"))));
    assert_eq!(result.refill_gb, Some(1.0));
    assert_eq!(result.available_gb, 1.2);
    assert!(!result.needs_top_up());
}

#[test]
fn low_volume_asks_for_a_top_up() {
    let result = poll(&overview_page(("9,5", "10"), None));
    assert_eq!(result.available_gb, 0.5);
    assert!(result.needs_top_up());
}

#[test]
fn unreadable_numbers_retry_after_a_minute() {
    let result = poll(&overview_page(("–", "–"), None));
    assert!(result.available_gb.is_nan());
    assert!(!result.needs_top_up());

    for mode in [SleepMode::Smart, SleepMode::Random, SleepMode::Fixed(Some(900))] {
        let interval = AdaptiveScheduler::new(mode).next_interval(result.scheduling_value());
        assert_eq!(interval.as_secs(), 60);
    }
}

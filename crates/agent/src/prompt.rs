//! Prompt construction.
//!
//! The current time is always passed in, so a fixed clock gives byte-for-byte
//! identical prompts.

use calsync_core::post::{MAX_POST_IMAGES, Post};
use chrono::DateTime;
use chrono_tz::Tz;

const DESCRIPTION_GUIDANCE: &str = "\
Include whichever of these the post states:
    Distance: total distance of the ride
    Time: meet time and roll-out time, if they differ
    Start and Finish: where the event starts and ends
    Pace: a number or a style such as \"no-drop\", \"easy\" or \"party pace\"
    Link: REQUIRED. Always include the most relevant link from the post
    Leaders: anyone named as leading the event
    Anything else a rider would want to know

Example:
    Group ride (no-drop) Behind Bars Ice Skating Ride.

    When: Saturday Jan 3, 2026 2:00 PM. Roll at 2:15pm.

    Start: Behind Bars Bicycle Shop. Finish: Lake of the Isles ice skating rink

    Distance: ~5 miles. Pace: typically ~12 mph.

    Link: https://www.instagram.com/p/DT_ZXQLCWeh/";

/// System prompt for the decision loop.
pub fn system_prompt(now: DateTime<Tz>, max_creates: usize) -> String {
    format!(
        "You are analyzing RSS posts to decide whether they announce events that belong on a community calendar.

The posts come from social accounts of cycling groups and community organizations. A post may be an event \
announcement, an update to an announced event (new time or place), a cancellation notice, or not an event at \
all (quotes, reflections, photo dumps).

Event details are often only in the attached images (posters, flyers). Images are not sent up front; request \
them with get_images.

Tools:
1. get_images - fetch the post's images
2. search_events_by_date - list calendar events in a date range
3. search_events_by_keyword - search upcoming calendar events by keyword
4. submit_decision - record a decision (REQUIRED)

Workflow:
1. Read the post text and judge whether it could plausibly be an event.
2. If it clearly is not, call submit_decision with action \"ignore\" right away.
3. Otherwise call get_images. You MUST call get_images before any decision other than \"ignore\".
4. Use the search tools to check whether the event is already on the calendar.
5. Call submit_decision once per distinct event. Set done=true on your last decision.

submit_decision fields:
- is_event: boolean
- confidence: number from 0.0 to 1.0
- action: \"create\", \"update\", \"cancel\", \"ignore\" or \"flag_for_review\"
- reasoning: why you decided this
- event: title, date (YYYY-MM-DD), day_of_week (the weekday you believe the date falls on), time (HH:MM or null), \
end_time, timezone, location, description. Required for create and update.
- related_event_id: the calendar event ID when updating or cancelling
- done: true when no further decisions follow for this post

Use \"flag_for_review\" when the workflow seems broken (a tool keeps failing, information you were told to \
expect is missing) and explain what went wrong.

Edge cases:
- A post may announce several events, for example a ride and a separate pre-ride meetup run by different \
people at different places or times. Create a separate event for each, at most {max_creates} per post.
- If submit_decision returns a validation error, fix the problem and call it again.
- Events described in the past tense should be ignored.
- If the date is missing, ignore the post.
- If the date is known but the start time is not, create the event with a null time.

Writing the description:
{DESCRIPTION_GUIDANCE}

For resolving relative dates such as \"this Saturday\", the current date and time is {now}. The timezone is {tz}.
Events in the past may still be created when the post was published before them and speaks of them in the \
present or future tense.

You MUST call submit_decision before finishing.",
        now = now.format("%A, %Y-%m-%d %H:%M"),
        tz = now.timezone().name(),
    )
}

/// The opening user message: post text plus an image-count hint.
pub fn user_message(post: &Post, tz: Tz) -> String {
    let image_count = post.image_urls.len().min(MAX_POST_IMAGES);
    let image_note = if image_count > 0 {
        format!("This post has {image_count} image(s) available. Call get_images to view them.")
    } else {
        "This post has no images.".to_string()
    };

    format!(
        "{}\n\n{image_note}\n\nRemember: you MUST call submit_decision with your final decision.",
        post_summary(post, tz)
    )
}

/// System prompt for the prefilter classifier.
pub fn prefilter_system_prompt(now: DateTime<Tz>) -> String {
    format!(
        "You are a binary classifier. Given an RSS post from a cycling community social account, decide whether \
the post could plausibly be announcing an event (a ride, meetup, race, social gathering or similar with a date \
or time).

Answer with exactly one word: YES or NO.

- YES: the post could announce, change, postpone, cancel or clarify an upcoming event and needs a closer look.
- NO: the post is clearly not an event announcement, or it talks in the past tense about an event that \
already happened.

Notes:
* For resolving relative dates such as \"this Saturday\", the current date and time is {now}. The timezone is {tz}.
* If the event is described in the future tense but seems to have happened recently, answer YES.
* If there is so little text that you would need the images to tell, answer YES.

Do NOT print ANYTHING OTHER THAN YES or NO.",
        now = now.format("%A, %Y-%m-%d %H:%M"),
        tz = now.timezone().name(),
    )
}

pub fn prefilter_user_message(post: &Post, tz: Tz) -> String {
    post_summary(post, tz)
}

fn post_summary(post: &Post, tz: Tz) -> String {
    let published = post
        .published
        .map(|p| p.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string())
        .unwrap_or_else(|| "Unknown".into());

    format!(
        "Analyze this RSS post:\n\nTitle: {}\nAuthor: {}\nLink: {}\nPublished: {published}\n\nContent:\n{}",
        post.title,
        post.author.as_deref().unwrap_or("Unknown"),
        post.link,
        post.content,
    )
}

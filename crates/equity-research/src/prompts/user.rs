//! User message templates for research nodes

pub const ANALYSIS: &str = "research.user.analysis";
pub const SYNTHESIS: &str = "research.user.synthesis";
pub const REVISION: &str = "research.user.revision";
pub const CRITIQUE: &str = "research.user.critique";

pub(super) const TEMPLATES: &[(&str, &str)] = &[
    (
        ANALYSIS,
        r#"{% if not market_wide %}Company: {{ company }} ({{ symbol }}){% if industry %}, {{ industry }}{% endif %}
{% endif %}Trade: {{ direction }}, {{ duration }} (about {{ horizon_days }} days)
Today's date: {{ today }}{% if cutoff %}
Cutoff date: {{ cutoff }}{% endif %}

{{ data_title }}:
{{ data }}"#,
    ),
    (
        SYNTHESIS,
        r#"Company: {{ company }} ({{ symbol }})
Trade: {{ direction }}, {{ duration }} (about {{ horizon_days }} days)
Weight most heavily: {{ emphasis }}
{% for analysis in analyses %}
## {{ analysis.name | upper }} SENTIMENT
{{ analysis.text }}
{% endfor %}"#,
    ),
    (
        REVISION,
        r#"{% include "research.user.synthesis" %}

Your original response:
{{ previous_draft }}

Revise your response based on this feedback:
{{ feedback }}"#,
    ),
    (
        CRITIQUE,
        r#"Trade duration: {{ duration }}

Evaluate this draft for compliance with the criteria:

{{ draft }}"#,
    ),
];

use crate::notify::Email;

/// Whole months read as months (30 days each), anything else as days.
/// Returns the compound form for the subject and the plain form for the body.
fn membership_length(days: i32) -> (String, String) {
    let plural = |n: i32, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if days >= 30 && days % 30 == 0 {
        let months = days / 30;
        (format!("{months}-Month"), plural(months, "Month"))
    } else {
        (format!("{days}-Day"), plural(days, "Day"))
    }
}

/// Confirmation sent after the early adopter grant lands. `days` is the
/// length of the grant that was actually applied.
pub fn early_adopter_email(
    from: &str,
    to: &str,
    referral_link: &str,
    site_url: &str,
    days: i32,
) -> Email {
    let (length_label, length_text) = membership_length(days);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Welcome to Pro</title></head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; background-color: #09090b; margin: 0; padding: 40px 20px; color: #e4e4e7;">
  <div style="max-width: 500px; margin: 0 auto; background-color: #18181b; border-radius: 16px; border: 1px solid #27272a; padding: 40px; text-align: center;">
    <h1 style="color: white; font-size: 20px; font-weight: 600; margin: 0 0 16px;">Welcome to the Club! 🎁</h1>
    <p style="color: #a1a1aa; font-size: 15px; line-height: 1.6;">
      Thank you for being one of our first users. We've added <strong>{length_text} of Pro Membership</strong> to your account!
    </p>
    <p style="color: #a1a1aa; font-size: 15px; line-height: 1.6;">
      You now have access to bulk processing, unlimited watermarks, and high-quality exports.
    </p>
    <div style="background-color: #27272a; border-radius: 8px; padding: 20px; margin: 32px 0; text-align: left;">
      <h2 style="color: white; font-size: 16px; margin: 0 0 8px;">Invite &amp; Earn More</h2>
      <p style="color: #d4d4d8; font-size: 14px; margin: 0 0 16px;">Get <strong>+1 Week Pro</strong> for every friend you refer.</p>
      <div style="background-color: #09090b; border: 1px solid #3f3f46; border-radius: 6px; padding: 12px; font-family: monospace; color: #22c55e; font-size: 13px; word-break: break-all;">{referral_link}</div>
    </div>
    <a href="{site_url}" style="display: inline-block; background-color: #22c55e; color: black; padding: 14px 32px; text-decoration: none; border-radius: 8px; font-weight: 600;">Start Creating</a>
    <p style="color: #71717a; font-size: 13px; margin-top: 40px;">Questions? Just reply to this email.</p>
  </div>
</body>
</html>"#
    );

    Email {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: format!("Your {length_label} Pro Membership is Here! 🎁"),
        html,
    }
}

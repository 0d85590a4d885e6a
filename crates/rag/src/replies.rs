//! Fixed replies that never reach the model.

pub const GREETING_FALLBACK: &str = "שלום! אני כאן לעזור בשאלות על חומרי הקורס באתיקה.\n\
אפשר לשאול למשל:\n\
- מה ההבדל בין תועלתנות לגישה של קאנט?\n\
- תן/י דוגמה לדילמה אתית בניהול משאבי אנוש\n\
- מה העקרונות המרכזיים של אחריות מקצועית?";

pub const OFF_TOPIC_WEATHER: &str = "אני כאן לעזור רק בנושאי הקורס באתיקה ובחומרי ההרצאות/סילבוס, \
ולכן אני לא יכול/ה לענות על מזג האוויר. אם תרצה/י, שאל/י שאלה על נושא מהקורס \
(למשל קאנט, תועלתנות, רולס, או דילמות אתיות ב-HR).";

pub const SOURCES_HIDDEN: &str = "כרגע אנחנו לא מציגים ציטוטים/מקורות במסך כדי למנוע בלבול מהקטעים החלקיים. \
המערכת עדיין מסמנת אם התשובה מבוססת על חומרי הקורס.";

pub const GROUNDING_CONFIRMED: &str = "כן. התשובה האחרונה נשענה על חומרי הקורס המצורפים.";

pub const GROUNDING_MISSING: &str = "לא מצאתי התאמה ישירה במקורות האחרונים.";

/// Reply for a question no attempt could ground.
pub const CLARIFICATION: &str = "לא מצאתי התאמה ברורה בחומרי הקורס לשאלה הזו. \
אפשר לחדד שבוע/הרצאה, מונח מדויק, או לצטט משפט מהמצגת כדי שאוכל לאתר את זה?";

//! JavaScript evaluation scripts
//!
//! The dynamic backend extracts course data with a single self-contained
//! script evaluated in the page context. The script mirrors the static
//! backend's selector cascade and resolves every URL against the page's
//! own location, so both backends report identical fields.

/// Extract the course record from the rendered DOM.
///
/// Returns `{name, description, architect, phone, email, hero, gallery,
/// resourcesLoaded}` as a plain object; missing fields are `null`.
pub const COURSE_EXTRACTION_SCRIPT: &str = r#"
    (() => {
        const firstText = (selectors) => {
            for (const sel of selectors) {
                const el = document.querySelector(sel);
                if (el) {
                    const text = (el.textContent || '').trim();
                    if (text) return text;
                }
            }
            return null;
        };

        const attrOf = (selector, attr) => {
            const el = document.querySelector(selector);
            if (!el) return null;
            const value = (el.getAttribute(attr) || '').trim();
            return value || null;
        };

        const resolve = (value) => {
            if (!value) return null;
            try {
                const abs = new URL(value, window.location.href);
                return ['http:', 'https:'].includes(abs.protocol) ? abs.href : null;
            } catch (e) {
                return null;
            }
        };

        const collectImages = (selectors) => {
            const seen = [];
            for (const sel of selectors) {
                document.querySelectorAll(sel).forEach(img => {
                    for (const attr of ['src', 'data-src']) {
                        const url = resolve(img.getAttribute(attr));
                        if (url && !seen.includes(url)) {
                            seen.push(url);
                        }
                    }
                });
            }
            return seen;
        };

        const name = firstText(['h1', '.course-name', '.page-title', 'title']);

        const description = firstText(['.course-description', '.about-course', '.description'])
            || attrOf('meta[name="description"]', 'content');

        const architect = firstText(['.architect', '.designer']);

        let phone = attrOf('a[href^="tel:"]', 'href');
        phone = phone ? phone.replace(/^tel:/, '').trim() : firstText(['.phone', '.contact-phone']);

        let email = attrOf('a[href^="mailto:"]', 'href');
        if (email) {
            email = email.replace(/^mailto:/, '').split('?')[0].trim() || null;
        }
        if (!email) {
            const body = document.body ? document.body.textContent : '';
            const match = body.match(/[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}/);
            email = match ? match[0] : null;
        }

        const hero = collectImages(['.hero img', '.banner img', '.main-image img']);
        const gallery = collectImages(['.gallery img', '.photo-gallery img', '.course-photos img']);

        return {
            name,
            description,
            architect,
            phone,
            email,
            hero,
            gallery,
            resourcesLoaded: performance.getEntriesByType('resource').length
        };
    })()
"#;
